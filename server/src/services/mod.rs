pub mod region_catalog;

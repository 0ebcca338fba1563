pub mod dataset_extractor;
pub mod filter_builder;
pub mod output_manager;

pub use dataset_extractor::{planned_requests, DatasetExtractor, ExtractionProgress, OutputFile};
pub use filter_builder::{build_filters, parse_literal_list, FilterSet, TableResolver};
pub use output_manager::{DatasetSummary, Manifest, OutputManager, RunReport};

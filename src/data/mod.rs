/// Data layer: record types, loading, generation and filtering.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv        generator
///        │                            │
///        ▼                            ▼
///   ┌──────────┐                ┌───────────┐
///   │  loader   │                │ generator │  demo dataset
///   └──────────┘                └───────────┘
///        │                            │
///        ▼                            ▼
///   ┌─────────────┐
///   │ RecordStore  │  marks, scores, bias + filter options
///   └─────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  FilterState predicates → filtered records
///   └──────────┘
/// ```

pub mod filter;
pub mod generator;
pub mod loader;
pub mod model;

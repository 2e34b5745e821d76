pub mod cleanliness;
pub mod effective_date;
pub mod judge;
pub mod metadata;

pub use cleanliness::CleanlinessRules;
pub use effective_date::{effective_date, group_effective_date, DateQuality, EffectiveDate};
pub use judge::{audit, AnalyzedFile, Analyzer, AuditSummary, Criterion, Decision, TIEBREAK_ORDER};
pub use metadata::{ExifProbe, MetadataProbe, NoMetadata};

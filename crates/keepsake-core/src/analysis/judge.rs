use super::cleanliness::CleanlinessRules;
use super::effective_date::{effective_date, group_effective_date, EffectiveDate};
use super::metadata::MetadataProbe;
use crate::config::AppConfig;
use crate::error::Error;
use crate::models::{EquivalenceKey, FileDescriptor, KeyedFile};
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, info};

/// Everything the comparator needs about one member of a group.
#[derive(Debug, Clone)]
pub struct AnalyzedFile {
    pub file: FileDescriptor,
    pub key: EquivalenceKey,
    pub effective_date: EffectiveDate,
    pub metadata_score: u32,
    pub cleanliness_penalty: u32,
}

impl AnalyzedFile {
    fn path_len(&self) -> usize {
        self.file.path.as_os_str().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Criterion {
    MetadataScore,
    EffectiveDate,
    FilenameCleanliness,
    PathLength,
    PathLexical,
}

/// Precedence of the winner comparator. The last entry is a total order on
/// paths, so two distinct files never tie.
pub const TIEBREAK_ORDER: [Criterion; 5] = [
    Criterion::MetadataScore,
    Criterion::EffectiveDate,
    Criterion::FilenameCleanliness,
    Criterion::PathLength,
    Criterion::PathLexical,
];

impl Criterion {
    /// `Less` means `a` is the better keeper under this criterion alone.
    pub fn compare(&self, a: &AnalyzedFile, b: &AnalyzedFile) -> Ordering {
        match self {
            Criterion::MetadataScore => b.metadata_score.cmp(&a.metadata_score),
            Criterion::EffectiveDate => a.effective_date.instant.cmp(&b.effective_date.instant),
            Criterion::FilenameCleanliness => a.cleanliness_penalty.cmp(&b.cleanliness_penalty),
            Criterion::PathLength => a.path_len().cmp(&b.path_len()),
            Criterion::PathLexical => a.file.path.cmp(&b.file.path),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Criterion::MetadataScore => "metadata score",
            Criterion::EffectiveDate => "older effective date",
            Criterion::FilenameCleanliness => "cleaner filename",
            Criterion::PathLength => "shorter path",
            Criterion::PathLexical => "path order",
        };
        f.write_str(name)
    }
}

/// Walks `TIEBREAK_ORDER` and reports the first criterion that separates
/// the two files.
pub fn rank(a: &AnalyzedFile, b: &AnalyzedFile) -> (Ordering, Option<Criterion>) {
    for criterion in TIEBREAK_ORDER {
        let ordering = criterion.compare(a, b);
        if ordering != Ordering::Equal {
            return (ordering, Some(criterion));
        }
    }
    (Ordering::Equal, None)
}

/// One keeper per equivalence class.
#[derive(Debug, Clone)]
pub struct Decision {
    pub key: EquivalenceKey,
    pub winner: AnalyzedFile,
    pub superseded: Vec<AnalyzedFile>,
    /// Shared date for the whole group, used for the winner's target path.
    pub effective_date: EffectiveDate,
    /// Criterion that separated the winner from the runner-up.
    pub decided_by: Option<Criterion>,
}

impl Decision {
    pub fn is_singleton(&self) -> bool {
        self.superseded.is_empty()
    }

    pub fn date_uncertain(&self) -> bool {
        self.effective_date.is_uncertain()
    }

    pub fn members(&self) -> impl Iterator<Item = &AnalyzedFile> {
        std::iter::once(&self.winner).chain(self.superseded.iter())
    }
}

pub struct Analyzer<'a> {
    probe: &'a dyn MetadataProbe,
    rules: CleanlinessRules,
    cutoff: DateTime<Utc>,
}

impl<'a> Analyzer<'a> {
    pub fn new(probe: &'a dyn MetadataProbe, rules: CleanlinessRules, cutoff: DateTime<Utc>) -> Self {
        Self {
            probe,
            rules,
            cutoff,
        }
    }

    pub fn from_config(probe: &'a dyn MetadataProbe, config: &AppConfig) -> Result<Self, Error> {
        Ok(Self::new(
            probe,
            CleanlinessRules::new(&config.cleanliness_patterns)?,
            config.sanity_cutoff(),
        ))
    }

    /// Groups files by equivalence key and picks a winner per group.
    /// Decisions come back ordered by winner path.
    pub fn analyze(&self, files: Vec<KeyedFile>) -> Vec<Decision> {
        let mut groups: AHashMap<EquivalenceKey, Vec<KeyedFile>> = AHashMap::new();
        for keyed in files {
            groups.entry(keyed.key).or_default().push(keyed);
        }

        let groups: Vec<(EquivalenceKey, Vec<KeyedFile>)> = groups.into_iter().collect();
        let mut decisions: Vec<Decision> = groups
            .into_par_iter()
            .filter_map(|(key, members)| self.decide(key, members))
            .collect();

        decisions.sort_by(|a, b| a.winner.file.path.cmp(&b.winner.file.path));

        let duplicates: usize = decisions.iter().map(|d| d.superseded.len()).sum();
        info!(
            "Analyzed {} equivalence classes, {} duplicates superseded",
            decisions.len(),
            duplicates
        );
        decisions
    }

    fn decide(&self, key: EquivalenceKey, members: Vec<KeyedFile>) -> Option<Decision> {
        let probe_metadata = members.len() > 1;
        let mut analyzed: Vec<AnalyzedFile> = members
            .into_iter()
            .map(|keyed| self.assess(keyed, probe_metadata))
            .collect();

        analyzed.sort_by(|a, b| rank(a, b).0);

        let decided_by = match analyzed.as_slice() {
            [first, second, ..] => rank(first, second).1,
            _ => None,
        };
        let effective_date = group_effective_date(analyzed.iter().map(|a| a.effective_date))?;

        let mut members = analyzed.into_iter();
        let winner = members.next()?;
        let superseded: Vec<AnalyzedFile> = members.collect();

        if let Some(criterion) = decided_by {
            debug!(
                "Kept {} over {} other(s) by {}",
                winner.file.path.display(),
                superseded.len(),
                criterion
            );
        }

        Some(Decision {
            key,
            winner,
            superseded,
            effective_date,
            decided_by,
        })
    }

    fn assess(&self, keyed: KeyedFile, probe_metadata: bool) -> AnalyzedFile {
        let metadata_score = if probe_metadata {
            self.probe.score(&keyed.file)
        } else {
            0
        };
        AnalyzedFile {
            effective_date: effective_date(&keyed.file, self.cutoff),
            cleanliness_penalty: self.rules.penalty(&keyed.file.stem()),
            metadata_score,
            key: keyed.key,
            file: keyed.file,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditSummary {
    pub total_files: usize,
    pub keep: usize,
    pub superseded: usize,
}

/// Pre-flight accounting check: every file is either kept or superseded,
/// exactly once.
pub fn audit(decisions: &[Decision], total_files: usize) -> Result<AuditSummary, Error> {
    let keep = decisions.len();
    let superseded: usize = decisions.iter().map(|d| d.superseded.len()).sum();

    if keep + superseded != total_files {
        return Err(Error::Audit(format!(
            "{} kept + {} superseded != {} files",
            keep, superseded, total_files
        )));
    }

    let mut seen = AHashSet::with_capacity(total_files);
    for member in decisions.iter().flat_map(|d| d.members()) {
        if !seen.insert(member.file.path.as_path()) {
            return Err(Error::Audit(format!(
                "{} appears in more than one decision",
                member.file.path.display()
            )));
        }
    }

    info!(
        "Audit passed: {} files = {} kept + {} superseded",
        total_files, keep, superseded
    );
    Ok(AuditSummary {
        total_files,
        keep,
        superseded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::effective_date::DateQuality;
    use crate::models::AttributeFlags;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct FixedScores(HashMap<PathBuf, u32>);

    impl MetadataProbe for FixedScores {
        fn score(&self, file: &FileDescriptor) -> u32 {
            self.0.get(&file.path).copied().unwrap_or(0)
        }
    }

    fn keyed(path: &str, year: i32, key: EquivalenceKey) -> KeyedFile {
        let modified = Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap();
        KeyedFile {
            file: FileDescriptor {
                path: PathBuf::from(path),
                folder_name: "x".into(),
                size: key.size,
                created: Some(modified),
                modified,
                flags: AttributeFlags::default(),
            },
            key,
        }
    }

    fn analyzer(probe: &dyn MetadataProbe) -> Analyzer<'_> {
        let config = AppConfig::new(vec!["/src".into()], "/dst");
        Analyzer::from_config(probe, &config).unwrap()
    }

    fn dup_key() -> EquivalenceKey {
        EquivalenceKey::from_size(100).with_partial(1).with_full(2)
    }

    #[test]
    fn test_metadata_outranks_age() {
        let probe = FixedScores(HashMap::from([(PathBuf::from("/b/new.jpg"), 5)]));
        let decisions = analyzer(&probe).analyze(vec![
            keyed("/a/old.jpg", 2010, dup_key()),
            keyed("/b/new.jpg", 2020, dup_key()),
        ]);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].winner.file.path, PathBuf::from("/b/new.jpg"));
        assert_eq!(decisions[0].decided_by, Some(Criterion::MetadataScore));
    }

    #[test]
    fn test_older_wins_when_metadata_equal() {
        let probe = FixedScores(HashMap::new());
        let decisions = analyzer(&probe).analyze(vec![
            keyed("/b/new.jpg", 2020, dup_key()),
            keyed("/a/old.jpg", 2010, dup_key()),
        ]);
        assert_eq!(decisions[0].winner.file.path, PathBuf::from("/a/old.jpg"));
        assert_eq!(decisions[0].decided_by, Some(Criterion::EffectiveDate));
    }

    #[test]
    fn test_clean_name_then_short_path_then_lexical() {
        let probe = FixedScores(HashMap::new());
        let analyzer = analyzer(&probe);

        let by_name = analyzer.analyze(vec![
            keyed("/p/Copy of pic.jpg", 2015, dup_key()),
            keyed("/p/pic.jpg", 2015, dup_key()),
        ]);
        assert_eq!(by_name[0].winner.file.path, PathBuf::from("/p/pic.jpg"));
        assert_eq!(by_name[0].decided_by, Some(Criterion::FilenameCleanliness));

        let by_length = analyzer.analyze(vec![
            keyed("/deeper/p/pic.jpg", 2015, dup_key()),
            keyed("/p/pic.jpg", 2015, dup_key()),
        ]);
        assert_eq!(by_length[0].winner.file.path, PathBuf::from("/p/pic.jpg"));
        assert_eq!(by_length[0].decided_by, Some(Criterion::PathLength));

        let by_lexical = analyzer.analyze(vec![
            keyed("/q/pic.jpg", 2015, dup_key()),
            keyed("/p/pic.jpg", 2015, dup_key()),
        ]);
        assert_eq!(by_lexical[0].winner.file.path, PathBuf::from("/p/pic.jpg"));
        assert_eq!(by_lexical[0].decided_by, Some(Criterion::PathLexical));
    }

    #[test]
    fn test_partitions_by_key_and_skips_probe_for_singletons() {
        struct Panicking;
        impl MetadataProbe for Panicking {
            fn score(&self, _file: &FileDescriptor) -> u32 {
                panic!("singletons are never probed");
            }
        }

        let decisions = analyzer(&Panicking).analyze(vec![
            keyed("/a.jpg", 2015, EquivalenceKey::from_size(1)),
            keyed("/b.jpg", 2015, EquivalenceKey::from_size(2)),
        ]);
        assert_eq!(decisions.len(), 2);
        assert!(decisions.iter().all(|d| d.is_singleton() && d.decided_by.is_none()));
    }

    #[test]
    fn test_group_date_uncertain_propagates() {
        let probe = FixedScores(HashMap::new());
        let mut item = keyed("/a.jpg", 2015, EquivalenceKey::from_size(1));
        item.file.created = Some(Utc.with_ymd_and_hms(1979, 12, 31, 0, 0, 0).unwrap());

        let decisions = analyzer(&probe).analyze(vec![item]);
        assert_eq!(decisions[0].effective_date.quality, DateQuality::SanityRejected);
        assert!(decisions[0].date_uncertain());
    }

    #[test]
    fn test_audit_detects_lost_files() {
        let probe = FixedScores(HashMap::new());
        let decisions = analyzer(&probe).analyze(vec![
            keyed("/a.jpg", 2015, dup_key()),
            keyed("/b.jpg", 2016, dup_key()),
            keyed("/c.jpg", 2016, EquivalenceKey::from_size(7)),
        ]);

        let summary = audit(&decisions, 3).unwrap();
        assert_eq!(summary.keep, 2);
        assert_eq!(summary.superseded, 1);
        assert!(matches!(audit(&decisions, 4), Err(Error::Audit(_))));
    }
}

use crate::analysis::{CleanlinessRules, Decision, EffectiveDate};
use crate::config::{AppConfig, DateZone};
use crate::error::Error;
use crate::models::FileDescriptor;
use ahash::AHashMap;
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

lazy_static::lazy_static! {
    /// Date prefix as written by the librarian itself.
    static ref OWN_DATE_PREFIX: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap();
    /// Any date-like prefix on an incoming stem, including its separator.
    static ref IMPORT_DATE_PREFIX: Regex = Regex::new(r"^\d{4}[-_]\d{2}[-_]\d{2}[-_ ]?").unwrap();
    static ref UNSAFE_FOLDER_CHARS: Regex = Regex::new(r"[^\w\-]").unwrap();
}

const UNKNOWN_FOLDER: &str = "unknown";

/// Where one surviving file should end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPlan {
    pub source: PathBuf,
    pub target_dir: PathBuf,
    pub target_filename: String,
    pub effective_date: EffectiveDate,
    /// Already at its target; nothing to do.
    pub is_noop: bool,
    pub superseded: Vec<PathBuf>,
}

impl TargetPlan {
    pub fn target_path(&self) -> PathBuf {
        self.target_dir.join(&self.target_filename)
    }

    pub fn date_uncertain(&self) -> bool {
        self.effective_date.is_uncertain()
    }

    fn involves(&self, path: &Path) -> bool {
        let wanted = fold_case(path);
        fold_case(&self.source) == wanted || self.superseded.iter().any(|p| fold_case(p) == wanted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another plan already claimed the same target path.
    DuplicateTarget { claimed_by: PathBuf },
    /// A file outside this group already lives at the target path.
    Occupied,
}

/// A plan that must not run because it would overwrite something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanConflict {
    pub plan: TargetPlan,
    pub reason: ConflictReason,
}

impl fmt::Display for PlanConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ConflictReason::DuplicateTarget { claimed_by } => write!(
                f,
                "{} -> {}: target already claimed by {}",
                self.plan.source.display(),
                self.plan.target_path().display(),
                claimed_by.display()
            ),
            ConflictReason::Occupied => write!(
                f,
                "{} -> {}: target occupied by an unrelated file",
                self.plan.source.display(),
                self.plan.target_path().display()
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlanSet {
    /// Plans cleared to run, ordered by source path.
    pub plans: Vec<TargetPlan>,
    pub conflicts: Vec<PlanConflict>,
}

impl PlanSet {
    pub fn noop_count(&self) -> usize {
        self.plans.iter().filter(|p| p.is_noop).count()
    }
}

pub struct Librarian {
    target_root: PathBuf,
    rules: CleanlinessRules,
    zone: DateZone,
}

impl Librarian {
    pub fn new(target_root: impl Into<PathBuf>, rules: CleanlinessRules, zone: DateZone) -> Self {
        Self {
            target_root: target_root.into(),
            rules,
            zone,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        Ok(Self::new(
            config.target_root_path(),
            CleanlinessRules::new(&config.cleanliness_patterns)?,
            config.date_zone,
        ))
    }

    pub fn plan(&self, decision: &Decision) -> TargetPlan {
        let winner = &decision.winner.file;
        let date = decision.effective_date.calendar_date(self.zone);
        let day = date.format("%Y-%m-%d").to_string();

        let target_dir = self
            .target_root
            .join(date.format("%Y").to_string())
            .join(date.format("%Y-%m").to_string());

        let target_filename = if self.is_organized(winner) {
            redate_filename(&winner.file_name(), &day)
        } else {
            self.import_filename(winner, &day)
        };

        let is_noop = target_dir.join(&target_filename) == winner.path;

        TargetPlan {
            source: winner.path.clone(),
            target_dir,
            target_filename,
            effective_date: decision.effective_date,
            is_noop,
            superseded: decision
                .superseded
                .iter()
                .map(|s| s.file.path.clone())
                .collect(),
        }
    }

    /// Plans every decision and withholds those whose target would collide
    /// with another plan or with an unrelated file already on disk.
    pub fn plan_all(&self, decisions: &[Decision]) -> PlanSet {
        let mut pending: Vec<TargetPlan> = decisions.iter().map(|d| self.plan(d)).collect();
        // No-ops hold their slot; everything else in path order.
        pending.sort_by(|a, b| b.is_noop.cmp(&a.is_noop).then_with(|| a.source.cmp(&b.source)));

        let mut claimed: AHashMap<String, PathBuf> = AHashMap::with_capacity(pending.len());
        let mut set = PlanSet::default();

        for plan in pending {
            let key = fold_case(&plan.target_path());

            if let Some(owner) = claimed.get(&key) {
                let conflict = PlanConflict {
                    reason: ConflictReason::DuplicateTarget {
                        claimed_by: owner.clone(),
                    },
                    plan,
                };
                warn!("Plan conflict: {}", conflict);
                set.conflicts.push(conflict);
                continue;
            }

            if !plan.is_noop && is_occupied(&plan) {
                let conflict = PlanConflict {
                    plan,
                    reason: ConflictReason::Occupied,
                };
                warn!("Plan conflict: {}", conflict);
                set.conflicts.push(conflict);
                continue;
            }

            claimed.insert(key, plan.source.clone());
            set.plans.push(plan);
        }

        set.plans.sort_by(|a, b| a.source.cmp(&b.source));
        info!(
            "Planned {} files ({} already in place), {} conflicts",
            set.plans.len(),
            set.noop_count(),
            set.conflicts.len()
        );
        set
    }

    fn is_organized(&self, file: &FileDescriptor) -> bool {
        file.path.starts_with(&self.target_root)
    }

    fn import_filename(&self, file: &FileDescriptor, day: &str) -> String {
        let stem = self.cleaned_stem(&file.stem());
        let folder = sanitize_folder_name(&file.folder_name);
        let name = format!("{}_{}_from_{}", day, stem, folder);
        match file.extension() {
            Some(ext) => format!("{}.{}", name, ext.to_lowercase()),
            None => name,
        }
    }

    fn cleaned_stem(&self, stem: &str) -> String {
        let undated = IMPORT_DATE_PREFIX.replace(stem, "");
        let undated = undated.trim();
        if undated.is_empty() {
            return stem.to_string();
        }
        self.rules.clean(undated)
    }
}

/// Rewrites only the leading date of a file that already lives in the
/// library, or adds one if it has none.
pub fn redate_filename(file_name: &str, day: &str) -> String {
    match OWN_DATE_PREFIX.find(file_name) {
        Some(m) if m.as_str() == day => file_name.to_string(),
        Some(m) => {
            debug!("Correcting date prefix of {} to {}", file_name, day);
            format!("{}{}", day, &file_name[m.end()..])
        }
        None => format!("{}_{}", day, file_name),
    }
}

pub fn sanitize_folder_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return UNKNOWN_FOLDER.to_string();
    }
    UNSAFE_FOLDER_CHARS.replace_all(trimmed, "_").into_owned()
}

fn fold_case(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

fn is_occupied(plan: &TargetPlan) -> bool {
    let target = plan.target_path();
    if std::fs::symlink_metadata(&target).is_err() {
        return false;
    }
    !plan.involves(&target)
}

use crate::error::Error;
use crate::librarian::TargetPlan;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

pub const RECEIPT_FILE_NAME: &str = "keepsake_receipt.txt";

/// Flat, serializable form of a `TargetPlan` handed to whatever performs
/// the physical moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub source_path: String,
    pub target_directory: String,
    pub target_filename: String,
    pub effective_date: String,
    pub date_uncertain: bool,
    pub is_noop: bool,
    /// Superseded duplicates as a JSON array of paths.
    pub superseded_source_paths: String,
}

impl TryFrom<&TargetPlan> for PlanRecord {
    type Error = Error;

    fn try_from(plan: &TargetPlan) -> Result<Self, Error> {
        let superseded: Vec<String> = plan
            .superseded
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        Ok(Self {
            source_path: plan.source.to_string_lossy().into_owned(),
            target_directory: plan.target_dir.to_string_lossy().into_owned(),
            target_filename: plan.target_filename.clone(),
            effective_date: plan
                .effective_date
                .instant
                .to_rfc3339_opts(SecondsFormat::Secs, true),
            date_uncertain: plan.date_uncertain(),
            is_noop: plan.is_noop,
            superseded_source_paths: serde_json::to_string(&superseded)?,
        })
    }
}

impl PlanRecord {
    pub fn superseded_paths(&self) -> Result<Vec<PathBuf>, Error> {
        let paths: Vec<String> = serde_json::from_str(&self.superseded_source_paths)?;
        Ok(paths.into_iter().map(PathBuf::from).collect())
    }
}

pub fn write_plan_csv(path: &Path, plans: &[TargetPlan]) -> Result<usize, Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for plan in plans {
        writer.serialize(PlanRecord::try_from(plan)?)?;
    }
    writer.flush()?;
    info!("Exported {} plan records to {}", plans.len(), path.display());
    Ok(plans.len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    MovedAsWinner,
    ConsolidatedDuplicateOf(PathBuf),
}

/// One line of the trace receipt left in a source folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptEntry {
    pub original_filename: String,
    pub disposition: Disposition,
    pub final_target: PathBuf,
}

impl fmt::Display for ReceiptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.disposition {
            Disposition::MovedAsWinner => write!(
                f,
                "[MOVED] {} -> {}",
                self.original_filename,
                self.final_target.display()
            ),
            Disposition::ConsolidatedDuplicateOf(winner) => write!(
                f,
                "[DUPLICATE CONSOLIDATED] {} (duplicate of {}) -> {}",
                self.original_filename,
                winner.display(),
                self.final_target.display()
            ),
        }
    }
}

/// Receipt entries grouped by the folder each original file lived in.
pub fn receipts_for(plans: &[TargetPlan]) -> BTreeMap<PathBuf, Vec<ReceiptEntry>> {
    let mut receipts: BTreeMap<PathBuf, Vec<ReceiptEntry>> = BTreeMap::new();

    for plan in plans {
        let target = plan.target_path();
        if !plan.is_noop {
            receipts
                .entry(folder_of(&plan.source))
                .or_default()
                .push(ReceiptEntry {
                    original_filename: file_name_of(&plan.source),
                    disposition: Disposition::MovedAsWinner,
                    final_target: target.clone(),
                });
        }
        for dup in &plan.superseded {
            receipts.entry(folder_of(dup)).or_default().push(ReceiptEntry {
                original_filename: file_name_of(dup),
                disposition: Disposition::ConsolidatedDuplicateOf(plan.source.clone()),
                final_target: target.clone(),
            });
        }
    }

    receipts
}

pub fn render_receipt(entries: &[ReceiptEntry]) -> String {
    entries.iter().map(|e| format!("{}\n", e)).collect()
}

fn folder_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sets a file's creation time. Platform specific; implemented outside the
/// decision core.
pub trait TimestampPatcher: Send + Sync {
    fn backdate(&self, path: &Path, when: DateTime<Utc>) -> io::Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub moved: usize,
    pub consolidated: usize,
    pub already_in_place: usize,
    pub receipts: BTreeMap<PathBuf, Vec<ReceiptEntry>>,
}

/// Performs the physical side of a plan set.
pub trait Executioner {
    fn execute(&self, plans: &[TargetPlan]) -> Result<ExecutionSummary, Error>;
}

/// Logs what would happen and renders receipts. Never touches the disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunExecutioner;

impl TimestampPatcher for DryRunExecutioner {
    fn backdate(&self, path: &Path, when: DateTime<Utc>) -> io::Result<()> {
        info!(
            "[dry run] would set creation time of {} to {}",
            path.display(),
            when.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        Ok(())
    }
}

impl Executioner for DryRunExecutioner {
    fn execute(&self, plans: &[TargetPlan]) -> Result<ExecutionSummary, Error> {
        let mut summary = ExecutionSummary::default();

        for plan in plans {
            let target = plan.target_path();
            if plan.is_noop {
                summary.already_in_place += 1;
            } else {
                info!(
                    "[dry run] would move {} -> {}",
                    plan.source.display(),
                    target.display()
                );
                self.backdate(&target, plan.effective_date.instant)?;
                summary.moved += 1;
            }
            for dup in &plan.superseded {
                info!(
                    "[dry run] would consolidate {} (duplicate of {})",
                    dup.display(),
                    plan.source.display()
                );
                summary.consolidated += 1;
            }
        }

        summary.receipts = receipts_for(plans);
        for (folder, entries) in &summary.receipts {
            info!(
                "[dry run] would write {} receipt line(s) to {}",
                entries.len(),
                folder.join(RECEIPT_FILE_NAME).display()
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DateQuality, EffectiveDate};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn plan(source: &str, noop: bool, superseded: &[&str]) -> TargetPlan {
        TargetPlan {
            source: PathBuf::from(source),
            target_dir: PathBuf::from("/library/2020/2020-06"),
            target_filename: "2020-06-01_pic_from_trip.jpg".into(),
            effective_date: EffectiveDate {
                instant: Utc.with_ymd_and_hms(2020, 6, 1, 8, 30, 0).unwrap(),
                quality: DateQuality::SanityRejected,
            },
            is_noop: noop,
            superseded: superseded.iter().map(PathBuf::from).collect(),
        }
    }

    #[test]
    fn test_plan_record_fields() {
        let record =
            PlanRecord::try_from(&plan("/trip/pic.jpg", false, &["/a/x.jpg", "/b/y.jpg"])).unwrap();
        assert_eq!(record.effective_date, "2020-06-01T08:30:00Z");
        assert!(record.date_uncertain);
        assert_eq!(record.superseded_source_paths, r#"["/a/x.jpg","/b/y.jpg"]"#);
        assert_eq!(record.superseded_paths().unwrap().len(), 2);
    }

    #[test]
    fn test_write_plan_csv() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("plan.csv");
        let plans = vec![plan("/trip/pic.jpg", false, &["/a/x.jpg"]), plan("/t/q.jpg", true, &[])];
        assert_eq!(write_plan_csv(&out, &plans).unwrap(), 2);

        let mut reader = csv::Reader::from_path(&out).unwrap();
        let records: Vec<PlanRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_path, "/trip/pic.jpg");
        assert!(records[1].is_noop);
        assert!(records[1].superseded_paths().unwrap().is_empty());
    }

    #[test]
    fn test_superseded_paths_with_separator_characters_survive_csv() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("plan.csv");
        let odd = ["/b/left|right.jpg", "/c/a, \"quoted\" name.jpg"];
        write_plan_csv(&out, &[plan("/trip/pic.jpg", false, &odd)]).unwrap();

        let mut reader = csv::Reader::from_path(&out).unwrap();
        let records: Vec<PlanRecord> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(
            records[0].superseded_paths().unwrap(),
            vec![PathBuf::from(odd[0]), PathBuf::from(odd[1])]
        );
    }

    #[test]
    fn test_receipts_grouped_by_source_folder() {
        let plans = vec![plan("/trip/pic.jpg", false, &["/trip/pic (1).jpg", "/backup/pic.jpg"])];
        let receipts = receipts_for(&plans);
        assert_eq!(receipts[Path::new("/trip")].len(), 2);
        assert_eq!(receipts[Path::new("/backup")].len(), 1);

        let text = render_receipt(&receipts[Path::new("/trip")]);
        assert!(text.starts_with("[MOVED] pic.jpg -> /library/2020/2020-06/2020-06-01_pic_from_trip.jpg"));
        assert!(text.contains("[DUPLICATE CONSOLIDATED] pic (1).jpg (duplicate of /trip/pic.jpg)"));
    }

    #[test]
    fn test_dry_run_counts() {
        let plans = vec![
            plan("/trip/pic.jpg", false, &["/a/x.jpg"]),
            plan("/library/2020/2020-06/2020-06-01_q.jpg", true, &["/b/q.jpg"]),
        ];
        let summary = DryRunExecutioner.execute(&plans).unwrap();
        assert_eq!(summary.moved, 1);
        assert_eq!(summary.consolidated, 2);
        assert_eq!(summary.already_in_place, 1);
        assert_eq!(summary.receipts.len(), 3);
    }
}

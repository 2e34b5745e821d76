use crate::config::DateZone;
use crate::models::FileDescriptor;
use chrono::{DateTime, Local, NaiveDate, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateQuality {
    /// Every raw timestamp passed the sanity threshold.
    Trusted,
    /// At least one raw timestamp was an artifact and was ignored.
    SanityRejected,
    /// No timestamp passed; the modification time was used anyway.
    Fallback,
}

impl DateQuality {
    pub fn is_uncertain(&self) -> bool {
        !matches!(self, DateQuality::Trusted)
    }
}

/// The date a file is organized under. Computed once per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveDate {
    pub instant: DateTime<Utc>,
    pub quality: DateQuality,
}

impl EffectiveDate {
    pub fn is_uncertain(&self) -> bool {
        self.quality.is_uncertain()
    }

    pub fn calendar_date(&self, zone: DateZone) -> NaiveDate {
        match zone {
            DateZone::Utc => self.instant.date_naive(),
            DateZone::Local => self.instant.with_timezone(&Local).date_naive(),
        }
    }
}

/// Earliest raw timestamp strictly after `cutoff`. Copies push creation
/// times forward but never backward, so the earliest sane value is the
/// closest to the original.
pub fn effective_date(file: &FileDescriptor, cutoff: DateTime<Utc>) -> EffectiveDate {
    let mut rejected = false;
    let mut earliest: Option<DateTime<Utc>> = None;

    for ts in [file.created, Some(file.modified)].into_iter().flatten() {
        if ts > cutoff {
            earliest = Some(earliest.map_or(ts, |e| e.min(ts)));
        } else {
            rejected = true;
        }
    }

    match earliest {
        Some(instant) => EffectiveDate {
            instant,
            quality: if rejected {
                DateQuality::SanityRejected
            } else {
                DateQuality::Trusted
            },
        },
        None => EffectiveDate {
            instant: file.modified,
            quality: DateQuality::Fallback,
        },
    }
}

/// Date shared by a duplicate group: the earliest member date that came from
/// a sane timestamp, or the earliest overall when every member fell back.
pub fn group_effective_date<I>(dates: I) -> Option<EffectiveDate>
where
    I: IntoIterator<Item = EffectiveDate>,
{
    let dates: Vec<EffectiveDate> = dates.into_iter().collect();
    dates
        .iter()
        .filter(|d| d.quality != DateQuality::Fallback)
        .min_by_key(|d| d.instant)
        .or_else(|| dates.iter().min_by_key(|d| d.instant))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttributeFlags;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn cutoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(1980, 1, 2, 0, 0, 0).unwrap()
    }

    fn file(created: Option<DateTime<Utc>>, modified: DateTime<Utc>) -> FileDescriptor {
        FileDescriptor {
            path: PathBuf::from("/photos/a.jpg"),
            folder_name: "photos".into(),
            size: 10,
            created,
            modified,
            flags: AttributeFlags::default(),
        }
    }

    #[test]
    fn test_earliest_valid_timestamp_wins() {
        let created = Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap();
        let modified = Utc.with_ymd_and_hms(2019, 7, 4, 12, 0, 0).unwrap();
        let date = effective_date(&file(Some(created), modified), cutoff());
        assert_eq!(date.instant, modified);
        assert_eq!(date.quality, DateQuality::Trusted);
    }

    #[test]
    fn test_1979_creation_is_rejected_and_flagged() {
        let created = Utc.with_ymd_and_hms(1979, 12, 31, 12, 0, 0).unwrap();
        let modified = Utc.with_ymd_and_hms(2020, 6, 1, 12, 0, 0).unwrap();
        let date = effective_date(&file(Some(created), modified), cutoff());
        assert_eq!(date.instant, modified);
        assert_eq!(date.calendar_date(DateZone::Utc).to_string(), "2020-06-01");
        assert!(date.is_uncertain());
    }

    #[test]
    fn test_threshold_itself_is_not_sane() {
        let modified = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();
        let date = effective_date(&file(Some(cutoff()), modified), cutoff());
        assert_eq!(date.instant, modified);
        assert_eq!(date.quality, DateQuality::SanityRejected);
    }

    #[test]
    fn test_all_invalid_falls_back_to_modified() {
        let created = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        let modified = Utc.with_ymd_and_hms(1979, 5, 5, 0, 0, 0).unwrap();
        let date = effective_date(&file(Some(created), modified), cutoff());
        assert_eq!(date.instant, modified);
        assert_eq!(date.quality, DateQuality::Fallback);
    }

    #[test]
    fn test_group_date_prefers_sane_members() {
        let fallback = EffectiveDate {
            instant: Utc.with_ymd_and_hms(1979, 1, 1, 0, 0, 0).unwrap(),
            quality: DateQuality::Fallback,
        };
        let later = EffectiveDate {
            instant: Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(),
            quality: DateQuality::Trusted,
        };
        let earlier = EffectiveDate {
            instant: Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap(),
            quality: DateQuality::SanityRejected,
        };
        assert_eq!(group_effective_date([fallback, later, earlier]), Some(earlier));
        assert_eq!(group_effective_date([fallback]), Some(fallback));
        assert_eq!(group_effective_date(Vec::new()), None);
    }
}

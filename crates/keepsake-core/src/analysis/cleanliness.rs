use crate::error::Error;
use regex::Regex;

/// Compiled filename-artifact patterns ("Copy of", "(1)", " - Copy").
#[derive(Debug, Clone)]
pub struct CleanlinessRules {
    patterns: Vec<Regex>,
}

impl CleanlinessRules {
    pub fn new(patterns: &[String]) -> Result<Self, Error> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    Error::InvalidConfig(format!("bad cleanliness pattern '{}': {}", p, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Number of artifact patterns the stem matches. Lower is cleaner.
    pub fn penalty(&self, stem: &str) -> u32 {
        self.patterns.iter().filter(|p| p.is_match(stem)).count() as u32
    }

    /// Strips every artifact until none match. Falls back to the original
    /// stem when nothing would be left.
    pub fn clean(&self, stem: &str) -> String {
        let mut current = stem.to_string();
        loop {
            let mut next = current.clone();
            for pattern in &self.patterns {
                next = pattern.replace_all(&next, "").into_owned();
            }
            let next = next.trim().to_string();
            if next == current {
                break;
            }
            current = next;
        }

        if current.is_empty() {
            stem.to_string()
        } else {
            current
        }
    }
}

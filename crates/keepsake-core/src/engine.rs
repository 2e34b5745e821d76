use crate::analysis::{self, Analyzer, AuditSummary, Decision, ExifProbe, MetadataProbe};
use crate::config::AppConfig;
use crate::error::Error;
use crate::hasher::{Funnel, FunnelStats, FunnelWarning, HashCache, RocksDbCache};
use crate::librarian::{Librarian, PlanSet};
use crate::progress::ProgressReporter;
use crate::scanner::{CrawlWarning, Crawler};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub struct PlanEngine {
    config: AppConfig,
    cache: Option<Box<dyn HashCache>>,
    probe: Box<dyn MetadataProbe>,
}

#[derive(Debug)]
pub struct PlanReport {
    pub crawl_duration: Duration,
    pub hash_duration: Duration,
    pub analyze_duration: Duration,
    pub plan_duration: Duration,
    pub files_scanned: usize,
    pub crawl_warnings: Vec<CrawlWarning>,
    pub funnel_warnings: Vec<FunnelWarning>,
    pub funnel_stats: FunnelStats,
    pub audit: AuditSummary,
    pub decisions: Vec<Decision>,
    pub plan_set: PlanSet,
}

impl PlanReport {
    pub fn duplicate_groups(&self) -> usize {
        self.decisions.iter().filter(|d| !d.is_singleton()).count()
    }

    pub fn superseded_files(&self) -> usize {
        self.audit.superseded
    }

    /// Bytes freed once every superseded duplicate is consolidated.
    pub fn reclaimable_bytes(&self) -> u64 {
        self.decisions
            .iter()
            .flat_map(|d| d.superseded.iter())
            .map(|s| s.file.size)
            .sum()
    }

    pub fn date_uncertain_files(&self) -> usize {
        self.decisions.iter().filter(|d| d.date_uncertain()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.crawl_warnings.len() + self.funnel_warnings.len()
    }
}

impl PlanEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            cache: None,
            probe: Box::new(ExifProbe),
        }
    }

    /// Use this cache instead of opening the on-disk one.
    pub fn with_cache(mut self, cache: Box<dyn HashCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn MetadataProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run the decision pipeline:
    /// 1. Parallel crawl of source roots plus the target root
    /// 2. Size / partial / cache / full hash funnel
    /// 3. Winner selection and pre-flight audit
    /// 4. Target planning with conflict detection
    ///
    /// Nothing is moved; the report is handed to an executioner.
    pub fn run(&self, reporter: &dyn ProgressReporter) -> Result<PlanReport, Error> {
        let config = self.config.resolved()?;

        let opened;
        let cache: &dyn HashCache = match &self.cache {
            Some(cache) => cache.as_ref(),
            None => {
                opened = RocksDbCache::open(&config.hash_cache_location())?;
                &opened
            }
        };

        let crawler = Crawler::from_config(&config)?;
        let analyzer = Analyzer::from_config(self.probe.as_ref(), &config)?;
        let librarian = Librarian::from_config(&config)?;

        let roots: Vec<PathBuf> = config
            .scan_roots()
            .into_iter()
            .map(PathBuf::from)
            .collect();
        info!("Processing directories: {:?}", roots);

        // Phase 1: Crawl
        reporter.on_crawl_start();
        let crawl_start = Instant::now();
        let crawl = crawler.crawl_parallel(&roots, reporter);
        let crawl_duration = crawl_start.elapsed();
        let files_scanned = crawl.files.len();
        reporter.on_crawl_complete(files_scanned, crawl_duration.as_secs_f64());
        debug!(
            "Crawl completed in {:.2}s: {} files, {} warnings",
            crawl_duration.as_secs_f64(),
            files_scanned,
            crawl.warnings.len()
        );

        // Phase 2: Funnel
        reporter.on_hash_start();
        let hash_start = Instant::now();
        let funnel = Funnel::new(cache, config.partial_chunk_size).run(crawl.files, reporter);
        let hash_duration = hash_start.elapsed();
        let hashed_files = funnel.files.len();
        reporter.on_hash_complete(hashed_files, hash_duration.as_secs_f64());
        debug!("Funnel completed in {:.2}s: {:?}", hash_duration.as_secs_f64(), funnel.stats);

        // Phase 3: Analyze
        reporter.on_analyze_start();
        let analyze_start = Instant::now();
        let decisions = analyzer.analyze(funnel.files);
        let audit = analysis::audit(&decisions, hashed_files)?;
        let analyze_duration = analyze_start.elapsed();
        reporter.on_analyze_complete(decisions.len(), analyze_duration.as_secs_f64());

        // Phase 4: Plan
        let plan_start = Instant::now();
        let plan_set = librarian.plan_all(&decisions);
        let plan_duration = plan_start.elapsed();
        reporter.on_plan_complete(
            plan_set.plans.len(),
            plan_set.conflicts.len(),
            plan_duration.as_secs_f64(),
        );

        cache.flush()?;

        Ok(PlanReport {
            crawl_duration,
            hash_duration,
            analyze_duration,
            plan_duration,
            files_scanned,
            crawl_warnings: crawl.warnings,
            funnel_warnings: funnel.warnings,
            funnel_stats: funnel.stats,
            audit,
            decisions,
            plan_set,
        })
    }
}

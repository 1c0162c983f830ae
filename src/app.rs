//! Command runners behind the `quotacast` subcommands

use std::collections::BTreeMap;
use std::future::Future;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use quotacast_core::alerts::{crossings, AlertLevel};
use quotacast_core::config::{Command, RecordArgs, Settings};
use quotacast_core::retry::retry_async;
use quotacast_core::store::{DataFile, UsageDocument};
use quotacast_core::usage::parse_usage_output;
use quotacast_core::{Cap, ProjectionEngine, Sample};

use crate::report::{self, Colors};

/// Runs one subcommand against the configured data file
pub struct App {
    settings: Settings,
    store: DataFile,
    engine: ProjectionEngine,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let store = settings.data_file();
        let engine = ProjectionEngine::new(settings.projection_params());
        Self {
            settings,
            store,
            engine,
        }
    }

    pub fn store(&self) -> &DataFile {
        &self.store
    }

    /// Dispatch a subcommand
    pub async fn run(&self, command: &Command) -> Result<()> {
        let now = Utc::now();
        let doc = match command {
            Command::Record(args) => self.record(args, now)?,
            Command::Ingest { file } => {
                let text = read_input(file.as_deref())?;
                self.ingest(&text, now)?
            }
            Command::Project => self.project(now)?,
            Command::Show { json } => {
                let doc = self.load()?;
                if *json {
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                    return Ok(());
                }
                doc
            }
            Command::Watch => return self.watch().await,
        };

        println!("{}", report::render(&doc, now, &Colors::new()));
        Ok(())
    }

    /// Load the document, logging any validation issues
    pub fn load(&self) -> Result<UsageDocument> {
        let doc = self
            .store
            .load()
            .with_context(|| format!("Failed to load usage data: {:?}", self.store.path()))?;
        for issue in doc.validate() {
            warn!("{:?}: {}", self.store.path(), issue);
        }
        Ok(doc)
    }

    /// Append a hand-entered sample
    pub fn record(&self, args: &RecordArgs, now: DateTime<Utc>) -> Result<UsageDocument> {
        let sample = sample_from_args(args, now)?;
        let mut resets = Vec::new();
        for (cap, raw) in [
            (Cap::Session, &args.session_reset),
            (Cap::Week, &args.week_reset),
            (Cap::ModelWeek, &args.model_week_reset),
        ] {
            if let Some(raw) = raw {
                resets.push((cap, parse_reset(raw)?));
            }
        }

        let mut doc = self.load()?;
        self.append(&mut doc, &sample);
        for (cap, reset) in resets {
            if !doc.set_reset(cap, Some(reset), None) {
                warn!("No {} reading recorded yet, ignoring its reset time", cap);
            }
        }

        self.refresh(&mut doc, now);
        self.save(&doc)?;
        Ok(doc)
    }

    /// Append the sample carried by captured `/usage` output
    pub fn ingest(&self, text: &str, now: DateTime<Utc>) -> Result<UsageDocument> {
        let snapshot = parse_usage_output(text);
        let sample = snapshot
            .to_sample(now)
            .context("No usage meters found in input")?;
        debug!("Parsed {} usage meters", snapshot.meters.len());

        let mut doc = self.load()?;
        self.append(&mut doc, &sample);
        for (cap, meter) in snapshot.cap_meters() {
            if let Some(info) = &meter.reset_info {
                doc.set_reset(cap, None, Some(info.clone()));
            }
        }

        self.refresh(&mut doc, now);
        self.save(&doc)?;
        Ok(doc)
    }

    /// Recompute projections for the stored history
    pub fn project(&self, now: DateTime<Utc>) -> Result<UsageDocument> {
        let mut doc = self.load()?;
        self.refresh(&mut doc, now);
        self.save(&doc)?;
        Ok(doc)
    }

    /// Replace every cap's projection with a fresh one
    pub fn refresh(&self, doc: &mut UsageDocument, now: DateTime<Utc>) {
        let history = doc.history(self.settings.history.capacity);
        let projections = self.engine.project_all(&history, &doc.cap_states(), now);
        debug!(
            "Projected {} caps from {} samples",
            projections.values().filter(|p| p.is_some()).count(),
            history.len()
        );
        doc.apply_projections(projections);
    }

    /// Thresholds crossed by `sample` relative to the previous values
    pub fn alerts_for(&self, previous: &BTreeMap<Cap, f64>, sample: &Sample) -> Vec<(Cap, u8)> {
        if !self.settings.alerts.enabled {
            return Vec::new();
        }
        sample
            .values
            .iter()
            .flat_map(|(&cap, &value)| {
                crossings(previous.get(&cap).copied(), value, &self.settings.alerts.thresholds)
                    .into_iter()
                    .map(move |threshold| (cap, threshold))
            })
            .collect()
    }

    /// Watch the data file until Ctrl-C
    pub async fn watch(&self) -> Result<()> {
        self.watch_until(tokio::signal::ctrl_c()).await
    }

    /// Watch the data file until `shutdown` completes.
    ///
    /// `shutdown` is polled across iterations, so a signal that arrives while
    /// a tick is still retrying a load stops the loop right after that tick.
    pub async fn watch_until<F: Future>(&self, shutdown: F) -> Result<()> {
        let period = Duration::from_secs(self.settings.poll_interval_secs);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Watching {:?} every {}s",
            self.store.path(),
            self.settings.poll_interval_secs
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let store = &self.store;
                    match retry_async(&self.settings.retry, || async move { store.load() }).await {
                        Ok(mut doc) => {
                            let now = Utc::now();
                            self.refresh(&mut doc, now);
                            println!("{}\n", report::render(&doc, now, &Colors::new()));
                        }
                        Err(e) => warn!("Giving up on {:?} until next tick: {}", store.path(), e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Stopping watch");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Store `sample` and log the thresholds it crosses
    fn append(&self, doc: &mut UsageDocument, sample: &Sample) {
        let previous: BTreeMap<Cap, f64> = sample
            .values
            .keys()
            .filter_map(|&cap| doc.last_value(cap).map(|v| (cap, v)))
            .collect();

        doc.record(sample, self.settings.history.capacity);
        for (cap, threshold) in self.alerts_for(&previous, sample) {
            let value = sample.get(cap).unwrap_or_default();
            match AlertLevel::for_threshold(threshold) {
                AlertLevel::Limit => warn!("{} cap reached its limit ({:.1}%)", cap, value),
                AlertLevel::Warning => warn!("{} cap passed {}% ({:.1}%)", cap, threshold, value),
                AlertLevel::Notice => info!("{} cap passed {}% ({:.1}%)", cap, threshold, value),
            }
        }
    }

    fn save(&self, doc: &UsageDocument) -> Result<()> {
        self.store
            .save(doc)
            .with_context(|| format!("Failed to save usage data: {:?}", self.store.path()))?;
        info!("Saved {} samples to {:?}", doc.historical_data.len(), self.store.path());
        Ok(())
    }
}

fn sample_from_args(args: &RecordArgs, now: DateTime<Utc>) -> Result<Sample> {
    let mut sample = Sample::new(now);
    for (cap, value) in [
        (Cap::Session, args.session),
        (Cap::Week, args.week),
        (Cap::ModelWeek, args.model_week),
    ] {
        let Some(value) = value else {
            continue;
        };
        if !(0.0..=100.0).contains(&value) {
            bail!("{} usage must be between 0 and 100 (got {})", cap, value);
        }
        sample = sample.with(cap, value);
    }

    if sample.values.is_empty() {
        bail!("Nothing to record: pass --session, --week or --model-week");
    }
    Ok(sample)
}

fn parse_reset(raw: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(raw.trim())
        .with_context(|| format!("Invalid reset time (expected RFC 3339): {}", raw))?;
    Ok(ts.with_timezone(&Utc))
}

/// Read `/usage` text from a file, or stdin when no file is given
fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file: {:?}", path)),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

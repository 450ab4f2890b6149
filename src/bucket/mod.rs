//! Bucketing - experiment-variant routing applied before planning.
//!
//! A [`BucketSelector`] consumes the caller's [`BucketParams`] and decides
//! which revision serves the request and whether a dry-run variant runs
//! alongside it.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use crate::config::{CubeBucketSettings, Engine, RevisionWeight, Settings};
use crate::model::ReportingRequest;
use crate::registry::RegistryProvider;

/// Errors raised while selecting a variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BucketingError {
    #[error("No runnable variant configured for cube '{cube}'")]
    NoVariant { cube: String },

    #[error("Revision {revision} is not available for cube '{cube}'")]
    UnknownRevision { cube: String, revision: u32 },

    #[error("Invalid bucket configuration: {0}")]
    InvalidConfig(String),
}

pub type BucketingResult<T> = Result<T, BucketingError>;

/// Caller-supplied parameters steering variant selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketParams {
    pub user_id: Option<String>,
    pub is_internal: bool,
    pub forced_revision: Option<u32>,
    pub forced_dry_run_revision: Option<u32>,
    pub forced_dry_run_engine: Option<Engine>,
}

impl BucketParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn internal(mut self) -> Self {
        self.is_internal = true;
        self
    }

    pub fn force_revision(mut self, revision: u32) -> Self {
        self.forced_revision = Some(revision);
        self
    }

    pub fn force_dry_run(mut self, revision: Option<u32>, engine: Option<Engine>) -> Self {
        self.forced_dry_run_revision = revision;
        self.forced_dry_run_engine = engine;
        self
    }

    fn forced_dry_run(&self) -> Option<BucketVariant> {
        if self.forced_dry_run_revision.is_none() && self.forced_dry_run_engine.is_none() {
            return None;
        }
        Some(BucketVariant {
            revision: self.forced_dry_run_revision,
            engine: self.forced_dry_run_engine,
        })
    }
}

/// One variant a curator executes: a revision and an optional pinned
/// engine. `None` revision means the cube's default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketVariant {
    pub revision: Option<u32>,
    pub engine: Option<Engine>,
}

impl BucketVariant {
    pub fn revision(revision: u32) -> Self {
        Self {
            revision: Some(revision),
            engine: None,
        }
    }
}

/// Outcome of bucketing one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BucketSelection {
    pub primary: BucketVariant,
    pub dry_run: Option<BucketVariant>,
}

/// Decides which variant serves a request.
pub trait BucketSelector: Send + Sync {
    fn select(
        &self,
        registry_name: &str,
        request: &ReportingRequest,
        params: BucketParams,
    ) -> BucketingResult<BucketSelection>;
}

/// Honours forced parameters and otherwise serves the cube's default
/// revision.
pub struct DefaultBucketSelector {
    registries: Arc<dyn RegistryProvider>,
}

impl DefaultBucketSelector {
    pub fn new(registries: Arc<dyn RegistryProvider>) -> Self {
        Self { registries }
    }
}

impl BucketSelector for DefaultBucketSelector {
    fn select(
        &self,
        registry_name: &str,
        request: &ReportingRequest,
        params: BucketParams,
    ) -> BucketingResult<BucketSelection> {
        // unknown registries and cubes are reported by the curator
        let cube = self
            .registries
            .get(registry_name)
            .and_then(|registry| registry.cube(&request.cube).cloned());

        if let (Some(cube), Some(revision)) = (&cube, params.forced_revision) {
            if !cube.has_revision(revision) {
                return Err(BucketingError::UnknownRevision {
                    cube: cube.name.clone(),
                    revision,
                });
            }
        }

        Ok(BucketSelection {
            primary: BucketVariant {
                revision: params.forced_revision,
                engine: None,
            },
            dry_run: params.forced_dry_run(),
        })
    }
}

#[derive(Debug, Clone)]
struct CubeBuckets {
    revisions: Vec<RevisionWeight>,
    internal_revisions: Vec<RevisionWeight>,
    dry_runs: Vec<(BucketVariant, u32)>,
}

impl CubeBuckets {
    fn from_settings(cube: &str, settings: &CubeBucketSettings) -> BucketingResult<Self> {
        check_total(cube, "revisions", &settings.revisions)?;
        check_total(cube, "internal_revisions", &settings.internal_revisions)?;

        let mut dry_runs = Vec::with_capacity(settings.dry_runs.len());
        for dry_run in &settings.dry_runs {
            let engine = dry_run
                .engine
                .as_deref()
                .map(str::parse::<Engine>)
                .transpose()
                .map_err(|e| BucketingError::InvalidConfig(format!("cube '{}': {}", cube, e)))?;
            dry_runs.push((
                BucketVariant {
                    revision: Some(dry_run.revision),
                    engine,
                },
                dry_run.percent,
            ));
        }
        let dry_run_total = percent_total(cube, "dry_runs", dry_runs.iter().map(|(_, percent)| *percent))?;
        if dry_run_total > 100 {
            return Err(BucketingError::InvalidConfig(format!(
                "cube '{}': dry_runs total {}%, above 100%",
                cube, dry_run_total
            )));
        }

        Ok(Self {
            revisions: settings.revisions.clone(),
            internal_revisions: settings.internal_revisions.clone(),
            dry_runs,
        })
    }

    fn table(&self, internal: bool) -> &[RevisionWeight] {
        if internal && !self.internal_revisions.is_empty() {
            &self.internal_revisions
        } else {
            &self.revisions
        }
    }

    fn knows(&self, revision: u32) -> bool {
        self.revisions
            .iter()
            .chain(&self.internal_revisions)
            .any(|w| w.revision == revision)
    }
}

fn check_total(cube: &str, table: &str, weights: &[RevisionWeight]) -> BucketingResult<()> {
    let total = percent_total(cube, table, weights.iter().map(|w| w.percent))?;
    if !weights.is_empty() && total != 100 {
        return Err(BucketingError::InvalidConfig(format!(
            "cube '{}': {} total {}%, expected 100%",
            cube, table, total
        )));
    }
    Ok(())
}

fn percent_total(cube: &str, table: &str, percents: impl IntoIterator<Item = u32>) -> BucketingResult<u32> {
    percents
        .into_iter()
        .try_fold(0u32, u32::checked_add)
        .ok_or_else(|| BucketingError::InvalidConfig(format!("cube '{}': {} percentages overflow", cube, table)))
}

/// Pick the entry whose cumulative range contains `roll` (0..100).
fn pick<T: Copy>(entries: impl IntoIterator<Item = (T, u32)>, roll: u32) -> Option<T> {
    let mut upper: u32 = 0;
    for (value, percent) in entries {
        upper = upper.saturating_add(percent);
        if roll < upper {
            return Some(value);
        }
    }
    None
}

/// Splits traffic between revisions by configured percentages.
///
/// Cubes without a bucket table are served their default revision.
#[derive(Debug, Clone, Default)]
pub struct WeightedBucketSelector {
    cubes: HashMap<String, CubeBuckets>,
}

impl WeightedBucketSelector {
    /// Build from `[buckets.<cube>]` settings, validating percentages.
    pub fn from_settings(settings: &Settings) -> BucketingResult<Self> {
        let cubes = settings
            .buckets
            .iter()
            .map(|(cube, buckets)| Ok((cube.clone(), CubeBuckets::from_settings(cube, buckets)?)))
            .collect::<BucketingResult<HashMap<_, _>>>()?;
        Ok(Self { cubes })
    }

    fn select_with(
        &self,
        request: &ReportingRequest,
        params: BucketParams,
        mut roll: impl FnMut() -> u32,
    ) -> BucketingResult<BucketSelection> {
        let Some(buckets) = self.cubes.get(&request.cube) else {
            return Ok(BucketSelection {
                primary: BucketVariant {
                    revision: params.forced_revision,
                    engine: None,
                },
                dry_run: params.forced_dry_run(),
            });
        };

        let revision = match params.forced_revision {
            Some(revision) if buckets.knows(revision) => revision,
            Some(revision) => {
                return Err(BucketingError::UnknownRevision {
                    cube: request.cube.clone(),
                    revision,
                })
            }
            None => {
                let table = buckets.table(params.is_internal);
                pick(table.iter().map(|w| (w.revision, w.percent)), roll()).ok_or_else(|| {
                    BucketingError::NoVariant {
                        cube: request.cube.clone(),
                    }
                })?
            }
        };

        let dry_run = match params.forced_dry_run() {
            Some(variant) => Some(variant),
            None if buckets.dry_runs.is_empty() => None,
            None => pick(buckets.dry_runs.iter().copied(), roll()),
        };

        debug!(
            cube = %request.cube,
            user = params.user_id.as_deref().unwrap_or("-"),
            revision,
            dry_run = ?dry_run,
            "Selected bucket"
        );
        Ok(BucketSelection {
            primary: BucketVariant::revision(revision),
            dry_run,
        })
    }
}

impl BucketSelector for WeightedBucketSelector {
    fn select(
        &self,
        _registry_name: &str,
        request: &ReportingRequest,
        params: BucketParams,
    ) -> BucketingResult<BucketSelection> {
        let mut rng = rand::rng();
        self.select_with(request, params, || rng.random_range(0..100))
    }
}

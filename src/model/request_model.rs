//! Request models - reporting requests resolved against a registry.

use std::fmt;
use std::sync::Arc;

use crate::config::Engine;
use crate::registry::{Cube, Registry};

use super::request::ReportingRequest;

/// Result type for request model resolution.
pub type RequestModelResult<T> = Result<T, RequestModelError>;

/// Reasons a reporting request cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestModelError {
    #[error("Unknown cube '{cube}' in registry '{registry}'")]
    UnknownCube { registry: String, cube: String },

    #[error("Request for cube '{0}' selects no fields")]
    NoFields(String),

    #[error("Request cannot force both dimension-driven and fact-driven evaluation")]
    ConflictingDrive,

    #[error("Rows per page must be positive")]
    InvalidPagination,

    #[error("Unknown field '{field}' in cube '{cube}'")]
    UnknownField { cube: String, field: String },

    #[error("Unknown filter field '{field}' in cube '{cube}'")]
    UnknownFilterField { cube: String, field: String },

    #[error("Sort field '{0}' is not among the selected fields")]
    SortFieldNotSelected(String),

    #[error("Revision {revision} is not defined for cube '{cube}'")]
    UnknownRevision { cube: String, revision: u32 },
}

/// How query evaluation is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveStrategy {
    /// Dimension tables anchor the query; fact data is joined in.
    DimensionDriven,
    /// The fact table anchors the query.
    FactDriven,
}

impl fmt::Display for DriveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriveStrategy::DimensionDriven => f.write_str("dimension-driven"),
            DriveStrategy::FactDriven => f.write_str("fact-driven"),
        }
    }
}

/// Options chosen by bucketing that shape resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelOptions {
    pub revision: Option<u32>,
    pub engine_hint: Option<Engine>,
}

/// A dimension touched by the request, with the aliases referencing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRef {
    pub dimension: String,
    pub aliases: Vec<String>,
    /// Whether any referenced alias is something other than the primary key.
    pub has_non_key: bool,
}

/// A reporting request validated against a registry.
///
/// Produced once per resolution and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct RequestModel {
    request: Arc<ReportingRequest>,
    registry_name: String,
    revision: u32,
    engine_hint: Option<Engine>,
    max_rows: u64,
    drive: DriveStrategy,
    dimension_refs: Vec<DimensionRef>,
    fact_aliases: Vec<String>,
}

impl RequestModel {
    /// Resolve a request against a registry.
    pub fn resolve(
        registry: &Registry,
        request: Arc<ReportingRequest>,
        options: ModelOptions,
    ) -> RequestModelResult<Self> {
        let cube = registry
            .cube(&request.cube)
            .ok_or_else(|| RequestModelError::UnknownCube {
                registry: registry.name.clone(),
                cube: request.cube.clone(),
            })?;

        if request.fields.is_empty() {
            return Err(RequestModelError::NoFields(cube.name.clone()));
        }
        if request.force_dimension_driven && request.force_fact_driven {
            return Err(RequestModelError::ConflictingDrive);
        }
        if request.pagination.rows_per_page == 0 {
            return Err(RequestModelError::InvalidPagination);
        }

        let revision = match options.revision {
            Some(revision) if cube.has_revision(revision) => revision,
            Some(revision) => {
                return Err(RequestModelError::UnknownRevision {
                    cube: cube.name.clone(),
                    revision,
                })
            }
            None => cube.default_revision().unwrap_or_default(),
        };

        let mut resolver = AliasResolver::new(registry, cube);
        for alias in request.field_aliases() {
            if !resolver.add(alias) {
                return Err(RequestModelError::UnknownField {
                    cube: cube.name.clone(),
                    field: alias.to_string(),
                });
            }
        }
        for filter in &request.filters {
            if !resolver.add(&filter.field) {
                return Err(RequestModelError::UnknownFilterField {
                    cube: cube.name.clone(),
                    field: filter.field.clone(),
                });
            }
        }
        for sort in &request.sort {
            if !request.field_aliases().any(|a| a == sort.field) {
                return Err(RequestModelError::SortFieldNotSelected(sort.field.clone()));
            }
        }

        let (dimension_refs, fact_aliases) = resolver.finish();

        let drive = if request.force_dimension_driven {
            DriveStrategy::DimensionDriven
        } else if request.force_fact_driven {
            DriveStrategy::FactDriven
        } else {
            let requests_metrics = request
                .field_aliases()
                .any(|alias| fact_aliases.iter().any(|f| f == alias));
            if requests_metrics {
                DriveStrategy::FactDriven
            } else {
                DriveStrategy::DimensionDriven
            }
        };

        let max_rows = request
            .pagination
            .start_index
            .saturating_add(request.pagination.rows_per_page);

        Ok(Self {
            registry_name: registry.name.clone(),
            revision,
            engine_hint: options.engine_hint,
            max_rows,
            drive,
            dimension_refs,
            fact_aliases,
            request,
        })
    }

    pub fn request(&self) -> &Arc<ReportingRequest> {
        &self.request
    }

    pub fn registry_name(&self) -> &str {
        &self.registry_name
    }

    pub fn cube(&self) -> &str {
        &self.request.cube
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    pub fn engine_hint(&self) -> Option<Engine> {
        self.engine_hint
    }

    /// Upper bound on rows the backend must produce for this request.
    pub fn max_rows(&self) -> u64 {
        self.max_rows
    }

    pub fn drive(&self) -> DriveStrategy {
        self.drive
    }

    pub fn is_dimension_driven(&self) -> bool {
        self.drive == DriveStrategy::DimensionDriven
    }

    pub fn include_row_count(&self) -> bool {
        self.request.include_row_count
    }

    /// Dimensions referenced by fields or filters, in first-reference order.
    pub fn dimension_refs(&self) -> &[DimensionRef] {
        &self.dimension_refs
    }

    /// Referenced aliases only a fact can serve.
    pub fn fact_aliases(&self) -> &[String] {
        &self.fact_aliases
    }
}

/// Attributes aliases to dimensions or facts, preserving first-reference order.
struct AliasResolver<'a> {
    registry: &'a Registry,
    cube: &'a Cube,
    dimension_refs: Vec<DimensionRef>,
    fact_aliases: Vec<String>,
}

impl<'a> AliasResolver<'a> {
    fn new(registry: &'a Registry, cube: &'a Cube) -> Self {
        Self {
            registry,
            cube,
            dimension_refs: Vec::new(),
            fact_aliases: Vec::new(),
        }
    }

    /// Record an alias. Returns false when the cube cannot serve it.
    fn add(&mut self, alias: &str) -> bool {
        let dimension = self
            .registry
            .cube_dimensions(self.cube)
            .find(|d| d.has_attribute(alias));

        if let Some(dimension) = dimension {
            let is_key = dimension.primary_key_alias == alias;
            match self
                .dimension_refs
                .iter_mut()
                .find(|r| r.dimension == dimension.name)
            {
                Some(existing) => {
                    if !existing.aliases.iter().any(|a| a == alias) {
                        existing.aliases.push(alias.to_string());
                    }
                    existing.has_non_key |= !is_key;
                }
                None => self.dimension_refs.push(DimensionRef {
                    dimension: dimension.name.clone(),
                    aliases: vec![alias.to_string()],
                    has_non_key: !is_key,
                }),
            }
            return true;
        }

        if self.cube.has_fact_column(alias) {
            if !self.fact_aliases.iter().any(|a| a == alias) {
                self.fact_aliases.push(alias.to_string());
            }
            return true;
        }

        false
    }

    fn finish(self) -> (Vec<DimensionRef>, Vec<String>) {
        (self.dimension_refs, self.fact_aliases)
    }
}

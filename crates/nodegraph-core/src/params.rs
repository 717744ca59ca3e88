//! Graph request parameters
//!
//! [`GraphQuery`] is the raw query string as the panel sends it. Every value is
//! kept as text and validated in [`GraphQuery::into_parameters`], so a bad
//! value surfaces as [`GraphError::InvalidParameter`] naming the parameter.

use crate::assembly::AssemblyMode;
use crate::error::GraphError;
use crate::models::{Direction, Resource, ResourceKind};
use crate::source::QueryWindow;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Raw `/api/graph/data` query parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQuery {
    pub depth: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub kind: Option<String>,
    /// Rendered resource id, alternative to namespace + name + kind
    pub root: Option<String>,
    pub direction: Option<String>,
    pub mode: Option<String>,
    /// Comma-separated rendered resource ids
    pub ignore: Option<String>,
    pub no_orphans: Option<String>,
    pub show_unmeshed: Option<String>,
    /// Epoch milliseconds
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Validated request parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub root: Option<Resource>,
    /// `None` when the request did not name a depth
    pub depth: Option<usize>,
    pub direction: Direction,
    pub mode: AssemblyMode,
    pub ignore: Vec<Resource>,
    pub no_orphans: bool,
    pub show_unmeshed: bool,
    pub window: QueryWindow,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            root: None,
            depth: None,
            direction: Direction::Both,
            mode: AssemblyMode::Snapshot,
            ignore: Vec::new(),
            no_orphans: false,
            show_unmeshed: false,
            window: QueryWindow::Instant,
        }
    }
}

impl Parameters {
    /// Root as rendered in logs
    pub fn root_id(&self) -> Option<String> {
        self.root.as_ref().map(Resource::id)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn invalid(param: &str, value: &str, reason: impl std::fmt::Display) -> GraphError {
    GraphError::InvalidParameter(format!("{}='{}': {}", param, value, reason))
}

fn parse<T>(param: &str, value: &Option<String>) -> Result<Option<T>, GraphError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    present(value)
        .map(|v| v.parse::<T>().map_err(|e| invalid(param, v, e)))
        .transpose()
}

fn parse_flag(param: &str, value: &Option<String>) -> Result<bool, GraphError> {
    match present(value).map(str::to_ascii_lowercase).as_deref() {
        None | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(invalid(param, other, "expected true or false")),
    }
}

impl GraphQuery {
    /// Validate the raw parameters. `step` is the resolution used when
    /// `from`/`to` describe a range.
    pub fn into_parameters(self, step: Duration) -> Result<Parameters, GraphError> {
        let root = self.root_resource()?;

        let depth = parse::<i64>("depth", &self.depth)?
            .map(|d| usize::try_from(d).map_err(|e| invalid("depth", &d.to_string(), e)))
            .transpose()?;

        let direction = parse::<Direction>("direction", &self.direction)?.unwrap_or_default();

        let mode = match parse::<AssemblyMode>("mode", &self.mode)? {
            Some(AssemblyMode::Expand) if root.is_none() => {
                return Err(GraphError::InvalidParameter(
                    "mode 'expand' needs a root resource".to_string(),
                ))
            }
            Some(mode) => mode,
            None if root.is_some() => AssemblyMode::Expand,
            None => AssemblyMode::Snapshot,
        };

        let ignore = present(&self.ignore)
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(|id| id.parse::<Resource>().map_err(|e| invalid("ignore", id, e)))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let from = parse::<i64>("from", &self.from)?;
        let to = parse::<i64>("to", &self.to)?;

        Ok(Parameters {
            root,
            depth,
            direction,
            mode,
            ignore,
            no_orphans: parse_flag("noOrphans", &self.no_orphans)?,
            show_unmeshed: parse_flag("showUnmeshed", &self.show_unmeshed)?,
            window: QueryWindow::from_millis(from, to, step),
        })
    }

    fn root_resource(&self) -> Result<Option<Resource>, GraphError> {
        if let Some(id) = present(&self.root) {
            return id
                .parse::<Resource>()
                .map(Some)
                .map_err(|e| invalid("root", id, e));
        }

        match (present(&self.namespace), present(&self.name)) {
            (Some(namespace), Some(name)) => {
                let kind = present(&self.kind)
                    .map(ResourceKind::parse_lenient)
                    .unwrap_or(ResourceKind::Unknown);
                Ok(Some(Resource::new(namespace, name, kind)))
            }
            (None, None) => Ok(None),
            (Some(_), None) => Err(GraphError::InvalidParameter(
                "namespace given without name".to_string(),
            )),
            (None, Some(_)) => Err(GraphError::InvalidParameter(
                "name given without namespace".to_string(),
            )),
        }
    }
}

//! Spatial aggregation units.
//!
//! A [`SpatialUnit`] names the granularity an aggregate groups locations
//! by. Each unit carries its own location column list and, where the
//! unit is geography-backed, the geometry column the result set exposes.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use eventide_error::{ErrorCode, ErrorContext, EventideError};

/// Highest administrative level with a geography mapping table.
const MAX_ADMIN_LEVEL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialUnit {
    /// Raw cell identifiers, no version.
    Cell,
    /// Cell identifiers with infrastructure version.
    VersionedCell,
    /// Site identifiers with infrastructure version.
    VersionedSite,
    /// Administrative region at the given level (1..=3), keyed by pcod.
    Admin(u8),
    /// Longitude/latitude point pairs.
    Lonlat,
}

impl SpatialUnit {
    /// Columns that identify a location at this unit.
    pub fn location_columns(&self) -> &'static [&'static str] {
        match self {
            SpatialUnit::Cell => &["location_id"],
            SpatialUnit::VersionedCell => &["location_id", "version"],
            SpatialUnit::VersionedSite => &["site_id", "version"],
            SpatialUnit::Admin(_) => &["pcod"],
            SpatialUnit::Lonlat => &["lon", "lat"],
        }
    }

    /// Geometry column exposed by results at this unit, if any.
    pub fn geom_column(&self) -> Option<&'static str> {
        match self {
            SpatialUnit::VersionedCell | SpatialUnit::VersionedSite | SpatialUnit::Lonlat => {
                Some("geom_point")
            }
            SpatialUnit::Cell | SpatialUnit::Admin(_) => None,
        }
    }

    /// Geography table mapping raw locations onto this unit, if one is
    /// needed. Only administrative units require a mapping join.
    pub fn mapping_table(&self) -> Option<String> {
        match self {
            SpatialUnit::Admin(level) => Some(format!("geography.admin{}", level)),
            _ => None,
        }
    }

    fn wire_names() -> Vec<String> {
        let mut names = vec![
            "cell".to_string(),
            "versioned-cell".to_string(),
            "versioned-site".to_string(),
            "lonlat".to_string(),
        ];
        for level in 1..=MAX_ADMIN_LEVEL {
            names.push(format!("admin{}", level));
        }
        names
    }
}

impl fmt::Display for SpatialUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialUnit::Cell => write!(f, "cell"),
            SpatialUnit::VersionedCell => write!(f, "versioned-cell"),
            SpatialUnit::VersionedSite => write!(f, "versioned-site"),
            SpatialUnit::Admin(level) => write!(f, "admin{}", level),
            SpatialUnit::Lonlat => write!(f, "lonlat"),
        }
    }
}

impl FromStr for SpatialUnit {
    type Err = EventideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cell" => Ok(SpatialUnit::Cell),
            "versioned-cell" => Ok(SpatialUnit::VersionedCell),
            "versioned-site" => Ok(SpatialUnit::VersionedSite),
            "lonlat" => Ok(SpatialUnit::Lonlat),
            other => {
                if let Some(level) = other.strip_prefix("admin") {
                    if let Ok(level) = level.parse::<u8>() {
                        if (1..=MAX_ADMIN_LEVEL).contains(&level) {
                            return Ok(SpatialUnit::Admin(level));
                        }
                    }
                }
                Err(EventideError::new(
                    ErrorCode::UnknownSpatialUnit,
                    format!("Spatial unit '{}' not known", other),
                )
                .with_context(ErrorContext::InvalidParameter {
                    parameter: "aggregation_unit".to_string(),
                    value: other.to_string(),
                    allowed: SpatialUnit::wire_names(),
                }))
            }
        }
    }
}

impl Serialize for SpatialUnit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Column value types surfaced in result metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Integer,
    Float,
    Text,
    Date,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Integer => write!(f, "integer"),
            ValueType::Float => write!(f, "float"),
            ValueType::Text => write!(f, "text"),
            ValueType::Date => write!(f, "date"),
        }
    }
}

//! The subset of the Sensu Go event the handler reads.
//!
//! Only the fields needed for validation, annotation overrides and metric
//! storage are modelled; everything else in the payload is ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::error::{HandlerError, Result};

pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub entity: Option<Entity>,
    #[serde(default)]
    pub check: Option<Check>,
    #[serde(default)]
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entity {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Check {
    #[serde(default)]
    pub metadata: ObjectMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Metrics {
    #[serde(default, deserialize_with = "null_as_default")]
    pub points: Vec<MetricPoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricPoint {
    pub name: String,
    pub value: f64,
    pub timestamp: i64,
    #[serde(default, deserialize_with = "tags_deserialize")]
    pub tags: Tags,
}

#[derive(Deserialize)]
struct MetricTag {
    name: String,
    #[serde(default)]
    value: String,
}

/// Sensu sends tags as `[{"name": .., "value": ..}]`; a plain object is
/// accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum TagsRepr {
    List(Vec<MetricTag>),
    Map(Tags),
}

fn tags_deserialize<'de, D>(deserializer: D) -> std::result::Result<Tags, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<TagsRepr>::deserialize(deserializer)? {
        None => Tags::new(),
        Some(TagsRepr::Map(tags)) => tags,
        Some(TagsRepr::List(list)) => list.into_iter().map(|t| (t.name, t.value)).collect(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl MetricPoint {
    pub fn new(timestamp: i64, name: &str, value: f64, tags: Tags) -> Self {
        MetricPoint {
            name: name.to_string(),
            value,
            timestamp,
            tags,
        }
    }

    /// Tags as a JSON object, keys in sorted order.
    pub fn tags_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.tags)
    }
}

impl Event {
    pub fn from_json(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Err(HandlerError::Event("empty event".into()));
        }
        serde_json::from_str(input).map_err(|e| HandlerError::Event(e.to_string()))
    }

    /// The checks the Sensu SDK runs before any handler sees the event.
    pub fn validate(&self) -> Result<()> {
        let entity = self
            .entity
            .as_ref()
            .ok_or_else(|| HandlerError::Event("event must contain an entity".into()))?;
        if entity.metadata.name.is_empty() {
            return Err(HandlerError::Event("entity name must not be empty".into()));
        }
        if self.check.is_none() && self.metrics.is_none() {
            return Err(HandlerError::Event(
                "event must contain a check or metrics".into(),
            ));
        }
        Ok(())
    }

    pub fn points(&self) -> &[MetricPoint] {
        self.metrics
            .as_ref()
            .map(|m| m.points.as_slice())
            .unwrap_or_default()
    }
}

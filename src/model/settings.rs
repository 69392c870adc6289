use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resource settings as persisted.
pub type Settings = BTreeMap<String, Value>;

/// Per-key change carried by an update payload.
///
/// An absent key deserializes to `Unset`, an explicit `null` to `Delete`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SettingChange {
    #[default]
    Unset,
    Delete,
    Set(Value),
}

impl<'de> Deserialize<'de> for SettingChange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => SettingChange::Delete,
            Some(value) => SettingChange::Set(value),
        })
    }
}

impl Serialize for SettingChange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            SettingChange::Unset | SettingChange::Delete => serializer.serialize_none(),
            SettingChange::Set(value) => value.serialize(serializer),
        }
    }
}

pub type SettingsUpdate = BTreeMap<String, SettingChange>;

/// Applies a three-way settings update in place and reports whether anything changed.
pub fn merge_settings(settings: &mut Settings, update: &SettingsUpdate) -> bool {
    let mut changed = false;
    for (key, change) in update {
        match change {
            SettingChange::Unset => {}
            SettingChange::Delete => {
                changed |= settings.remove(key).is_some();
            }
            SettingChange::Set(value) => {
                if settings.get(key) != Some(value) {
                    settings.insert(key.clone(), value.clone());
                    changed = true;
                }
            }
        }
    }
    changed
}

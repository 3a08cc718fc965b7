use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::catalog::defaults_for_role;
use super::{Action, Module, Role};

/// Grants for a single module. All four keys are required on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub struct ModulePermissions {
    pub view: bool,
    pub create: bool,
    pub edit: bool,
    pub delete: bool,
}

impl ModulePermissions {
    pub const NONE: ModulePermissions = ModulePermissions::new(false, false, false, false);
    pub const ALL: ModulePermissions = ModulePermissions::new(true, true, true, true);

    pub const fn new(view: bool, create: bool, edit: bool, delete: bool) -> Self {
        Self { view, create, edit, delete }
    }

    pub fn allows(&self, action: Action) -> bool {
        match action {
            Action::View => self.view,
            Action::Create => self.create,
            Action::Edit => self.edit,
            Action::Delete => self.delete,
        }
    }

    fn set(&mut self, action: Action, value: bool) {
        match action {
            Action::View => self.view = value,
            Action::Create => self.create = value,
            Action::Edit => self.edit = value,
            Action::Delete => self.delete = value,
        }
    }
}

/// Complete module x action grant table for one user.
///
/// Every module always resolves to a record; there is no way to build a
/// partially populated matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPermissions {
    grants: [ModulePermissions; Module::COUNT],
}

impl UserPermissions {
    pub const fn uniform(grant: ModulePermissions) -> Self {
        Self {
            grants: [grant; Module::COUNT],
        }
    }

    pub fn none() -> Self {
        Self::uniform(ModulePermissions::NONE)
    }

    pub fn get(&self, module: Module) -> ModulePermissions {
        self.grants[module.index()]
    }

    /// Returns a copy with `module` replaced.
    pub fn with(mut self, module: Module, grant: ModulePermissions) -> Self {
        self.grants[module.index()] = grant;
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Module, ModulePermissions)> + '_ {
        Module::ALL.into_iter().map(move |m| (m, self.get(m)))
    }

    /// Encodes the full matrix as a JSON object keyed by module name, in
    /// canonical module order.
    pub fn to_json(&self) -> String {
        // map of fixed string keys to plain bool records, cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decodes a stored matrix. Never fails: unreadable or legacy documents
    /// resolve to the role defaults, and current-format documents missing
    /// modules (or action keys) are completed from the role defaults.
    pub fn parse(raw: Option<&str>, role: Role) -> Self {
        let defaults = defaults_for_role(role);

        let raw = match raw.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return defaults,
        };

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(role = %role, error = %err, "stored permissions not decodable, using role defaults");
                return defaults;
            }
        };

        if !value_is_current_format(&value) {
            tracing::debug!(role = %role, "stored permissions in legacy format, using role defaults");
            return defaults;
        }

        // value_is_current_format guarantees an object
        let Some(doc) = value.as_object() else {
            return defaults;
        };

        let mut grants = defaults.grants;
        for module in Module::ALL {
            let fallback = defaults.get(module);
            grants[module.index()] = match doc.get(module.as_str()) {
                Some(Value::Object(record)) => complete_record(record, fallback),
                Some(_) => {
                    tracing::debug!(module = %module, "module entry is not an object, using role default");
                    fallback
                }
                None => {
                    tracing::debug!(module = %module, role = %role, "module missing from stored permissions, filling from role defaults");
                    fallback
                }
            };
        }

        Self { grants }
    }
}

fn complete_record(record: &Map<String, Value>, fallback: ModulePermissions) -> ModulePermissions {
    let mut grant = fallback;
    for action in Action::ALL {
        if let Some(value) = record.get(action.as_str()).and_then(Value::as_bool) {
            grant.set(action, value);
        }
    }
    grant
}

fn value_is_current_format(value: &Value) -> bool {
    let Some(doc) = value.as_object() else {
        return false;
    };

    Module::ALL.iter().any(|module| {
        doc.get(module.as_str())
            .and_then(Value::as_object)
            .map(|record| Action::ALL.iter().any(|a| record.contains_key(a.as_str())))
            .unwrap_or(false)
    })
}

/// True when `raw` decodes to a module x action document: a JSON object
/// where at least one known module maps to an object with at least one
/// recognized action key.
pub fn is_current_format(raw: Option<&str>) -> bool {
    raw.and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .map(|value| value_is_current_format(&value))
        .unwrap_or(false)
}

impl Serialize for UserPermissions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Module::COUNT))?;
        for (module, grant) in self.iter() {
            map.serialize_entry(module.as_str(), &grant)?;
        }
        map.end()
    }
}

/// Strict decoding for documents arriving through the API: every module and
/// every action key must be present.
impl<'de> Deserialize<'de> for UserPermissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MatrixVisitor;

        impl<'de> Visitor<'de> for MatrixVisitor {
            type Value = UserPermissions;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an object mapping every module to its view/create/edit/delete grants")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut grants: [Option<ModulePermissions>; Module::COUNT] = [None; Module::COUNT];

                while let Some(module) = access.next_key::<Module>()? {
                    if grants[module.index()].is_some() {
                        return Err(de::Error::custom(format!("duplicate module `{module}`")));
                    }
                    grants[module.index()] = Some(access.next_value()?);
                }

                let mut matrix = UserPermissions::none();
                for module in Module::ALL {
                    let grant = grants[module.index()]
                        .ok_or_else(|| de::Error::custom(format!("missing module `{module}`")))?;
                    matrix = matrix.with(module, grant);
                }
                Ok(matrix)
            }
        }

        deserializer.deserialize_map(MatrixVisitor)
    }
}

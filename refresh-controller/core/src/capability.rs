use serde::{Deserialize, Serialize};

/// The resource a capability check asks about. Empty strings mean "unset";
/// an empty `namespace` asks about the whole cluster.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Attributes {
    pub verb: String,
    pub group: String,
    pub resource: String,
    pub namespace: String,
    pub name: String,
}

/// A single capability check submitted by the UI.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAttributes {
    pub id: String,
    pub attributes: Option<Attributes>,
}

/// The outcome of one [`ReviewAttributes`].
///
/// `error` is set when no decision could be obtained. A denied check is not an
/// error: it has `allowed == false` and, usually, a `denied_reason`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub id: String,
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === impl Attributes ===

impl Attributes {
    pub fn new(verb: impl ToString, group: impl ToString, resource: impl ToString) -> Self {
        Self {
            verb: verb.to_string(),
            group: group.to_string(),
            resource: resource.to_string(),
            ..Default::default()
        }
    }

    pub fn in_namespace(mut self, namespace: impl ToString) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    pub fn named(mut self, name: impl ToString) -> Self {
        self.name = name.to_string();
        self
    }
}

// === impl CheckResult ===

impl CheckResult {
    pub fn failed(id: impl ToString, error: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

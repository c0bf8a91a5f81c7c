use serde::{Deserialize, Deserializer, Serialize};

use crate::cache::Record;
use crate::utils::format_phone;

/// Guest record as returned by the remote directory's list and search endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteGuest {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl RemoteGuest {
    /// Convert to the cached summary shape, deriving the search key now
    /// rather than at query time.
    pub fn into_summary(self) -> GuestSummary {
        GuestSummary::new(
            self.id,
            self.name.unwrap_or_default(),
            non_blank(self.phone),
            non_blank(self.email),
        )
    }
}

// Response from GET /guests?page=&pageSize=
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GuestPage {
    #[serde(default)]
    pub items: Vec<RemoteGuest>,
    /// Advisory only; end of data is detected from a short page.
    #[serde(default)]
    pub total: Option<u64>,
}

/// Shape written to disk. Deserializing goes through here so the
/// normalized key is always re-derived from the other fields.
#[derive(Deserialize)]
struct StoredGuest {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl From<StoredGuest> for GuestSummary {
    fn from(stored: StoredGuest) -> Self {
        GuestSummary::new(stored.id, stored.name, stored.phone, stored.email)
    }
}

/// The only entity persisted by the local cache.
///
/// Fields are private so `normalized_key` can never drift from
/// `name`/`phone`/`email`: every constructor derives it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "StoredGuest")]
pub struct GuestSummary {
    id: String,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    normalized_key: String,
}

impl GuestSummary {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        phone: Option<String>,
        email: Option<String>,
    ) -> Self {
        let name = name.into();
        let normalized_key = normalize_key(&name, phone.as_deref(), email.as_deref());
        Self {
            id: id.into(),
            name,
            phone,
            email,
            normalized_key,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn normalized_key(&self) -> &str {
        &self.normalized_key
    }

    /// Name for list display, falling back to the id for nameless guests.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// One-line rendering used by the CLI result list.
    pub fn display_line(&self) -> String {
        let mut parts = vec![self.display_name().to_string()];
        if let Some(phone) = self.phone() {
            parts.push(format_phone(phone));
        }
        if let Some(email) = self.email() {
            parts.push(email.to_string());
        }
        format!("[{}] {}", self.id, parts.join(" · "))
    }
}

impl Record for GuestSummary {
    fn primary_key(&self) -> &str {
        &self.id
    }

    fn index_key(&self) -> &str {
        &self.normalized_key
    }
}

/// Lower-cased, space-joined name, phone and email. Blank fields are skipped.
pub fn normalize_key(name: &str, phone: Option<&str>, email: Option<&str>) -> String {
    [Some(name), phone, email]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// The directory has served ids both as strings and as integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Str(String),
        Int(i64),
    }

    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Str(s) => s,
        IdRepr::Int(n) => n.to_string(),
    })
}

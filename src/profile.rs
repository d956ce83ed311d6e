use crate::store::{create_typed, list_typed, Collection, ListQuery, RecordStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub pizza_place: String,
    pub doctor: String,
    pub preferred_time: String,
    pub payment_method: String,
}

/// What the assistant knows about the person it calls for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    /// Stored as a JSON-encoded string.
    #[serde(with = "preferences_as_json")]
    pub preferences: Preferences,
    pub emergency_contact: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileField {
    Name,
    Phone,
    Email,
    Address,
    EmergencyContact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreferenceField {
    PizzaPlace,
    Doctor,
    PreferredTime,
    PaymentMethod,
}

impl UserProfile {
    pub fn update_field(&mut self, field: ProfileField, value: impl Into<String>) {
        let slot = match field {
            ProfileField::Name => &mut self.name,
            ProfileField::Phone => &mut self.phone,
            ProfileField::Email => &mut self.email,
            ProfileField::Address => &mut self.address,
            ProfileField::EmergencyContact => &mut self.emergency_contact,
        };
        *slot = value.into();
        self.updated_at = Utc::now();
    }

    pub fn update_preference(&mut self, field: PreferenceField, value: impl Into<String>) {
        let prefs = &mut self.preferences;
        let slot = match field {
            PreferenceField::PizzaPlace => &mut prefs.pizza_place,
            PreferenceField::Doctor => &mut prefs.doctor,
            PreferenceField::PreferredTime => &mut prefs.preferred_time,
            PreferenceField::PaymentMethod => &mut prefs.payment_method,
        };
        *slot = value.into();
        self.updated_at = Utc::now();
    }
}

pub async fn save_profile<S: RecordStore>(
    store: &S,
    profile: &UserProfile,
) -> Result<UserProfile> {
    create_typed(store, Collection::UserProfiles, profile).await
}

pub async fn find_profile<S: RecordStore>(
    store: &S,
    user_id: &str,
) -> Result<Option<UserProfile>> {
    let query = ListQuery::new().where_eq("userId", user_id).limit(1);
    let profiles: Vec<UserProfile> = list_typed(store, Collection::UserProfiles, &query).await?;
    Ok(profiles.into_iter().next())
}

mod preferences_as_json {
    use super::*;
    use serde::de::Error as _;
    use serde::ser::Error as _;

    pub fn serialize<S: Serializer>(
        prefs: &Preferences,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = serde_json::to_string(prefs).map_err(S::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Preferences, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        if encoded.trim().is_empty() {
            return Ok(Preferences::default());
        }
        serde_json::from_str(&encoded).map_err(D::Error::custom)
    }
}

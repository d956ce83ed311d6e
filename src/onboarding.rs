use crate::api::logging::emit_profile_save_error;
use crate::auth::AuthProvider;
use crate::profile::{save_profile, Preferences, UserProfile};
use crate::store::RecordStore;
use anyhow::{bail, Result};
use chrono::Utc;

const DEFAULT_PREFERRED_TIME: &str = "morning";
const DEFAULT_PAYMENT_METHOD: &str = "card";
pub const PREFERRED_TIMES: [&str; 3] = ["morning", "afternoon", "evening"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingField {
    Name,
    EmergencyContact,
    Phone,
    Address,
    PizzaPlace,
    Doctor,
    PreferredTime,
}

impl OnboardingField {
    pub fn label(&self) -> &'static str {
        match self {
            OnboardingField::Name => "Full Name",
            OnboardingField::EmergencyContact => "Emergency Contact",
            OnboardingField::Phone => "Phone Number",
            OnboardingField::Address => "Address",
            OnboardingField::PizzaPlace => "Favorite Pizza Place",
            OnboardingField::Doctor => "Doctor/Clinic",
            OnboardingField::PreferredTime => "Preferred Time",
        }
    }
}

pub struct OnboardingStep {
    pub title: &'static str,
    pub subtitle: &'static str,
    pub fields: &'static [OnboardingField],
}

pub static STEPS: [OnboardingStep; 4] = [
    OnboardingStep {
        title: "Personal Information",
        subtitle: "Tell us about yourself",
        fields: &[OnboardingField::Name, OnboardingField::EmergencyContact],
    },
    OnboardingStep {
        title: "Contact Details",
        subtitle: "How can we reach you?",
        fields: &[OnboardingField::Phone, OnboardingField::Address],
    },
    OnboardingStep {
        title: "Preferences",
        subtitle: "Customize your experience",
        fields: &[OnboardingField::PizzaPlace, OnboardingField::Doctor],
    },
    OnboardingStep {
        title: "All Set!",
        subtitle: "Your AI assistant is ready",
        fields: &[],
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnboardingData {
    pub name: String,
    pub emergency_contact: String,
    pub phone: String,
    pub address: String,
    pub pizza_place: String,
    pub doctor: String,
    pub preferred_time: String,
}

impl Default for OnboardingData {
    fn default() -> Self {
        Self {
            name: String::new(),
            emergency_contact: String::new(),
            phone: String::new(),
            address: String::new(),
            pizza_place: String::new(),
            doctor: String::new(),
            preferred_time: DEFAULT_PREFERRED_TIME.to_string(),
        }
    }
}

impl OnboardingData {
    pub fn get(&self, field: OnboardingField) -> &str {
        match field {
            OnboardingField::Name => &self.name,
            OnboardingField::EmergencyContact => &self.emergency_contact,
            OnboardingField::Phone => &self.phone,
            OnboardingField::Address => &self.address,
            OnboardingField::PizzaPlace => &self.pizza_place,
            OnboardingField::Doctor => &self.doctor,
            OnboardingField::PreferredTime => &self.preferred_time,
        }
    }

    fn slot(&mut self, field: OnboardingField) -> &mut String {
        match field {
            OnboardingField::Name => &mut self.name,
            OnboardingField::EmergencyContact => &mut self.emergency_contact,
            OnboardingField::Phone => &mut self.phone,
            OnboardingField::Address => &mut self.address,
            OnboardingField::PizzaPlace => &mut self.pizza_place,
            OnboardingField::Doctor => &mut self.doctor,
            OnboardingField::PreferredTime => &mut self.preferred_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced(usize),
    /// Blank fields on the current step; the wizard did not move.
    MissingFields(Vec<OnboardingField>),
    /// The last step is showing; call [`OnboardingWizard::complete`].
    ReadyToComplete,
}

#[derive(Debug, Clone, Default)]
pub struct OnboardingWizard {
    step: usize,
    data: OnboardingData,
}

impl OnboardingWizard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_step(&self) -> usize {
        self.step
    }

    pub fn step(&self) -> &'static OnboardingStep {
        &STEPS[self.step.min(STEPS.len() - 1)]
    }

    pub fn step_count(&self) -> usize {
        STEPS.len()
    }

    pub fn data(&self) -> &OnboardingData {
        &self.data
    }

    pub fn set_field(&mut self, field: OnboardingField, value: impl Into<String>) {
        *self.data.slot(field) = value.into();
    }

    pub fn choose_preferred_time(&mut self, time: &str) -> Result<()> {
        if !PREFERRED_TIMES.contains(&time) {
            bail!("preferred time must be one of {}", PREFERRED_TIMES.join(", "));
        }
        self.set_field(OnboardingField::PreferredTime, time);
        Ok(())
    }

    /// Blank fields of `step`. Steps without fields, and unknown steps, have
    /// none.
    pub fn missing_fields(&self, step: usize) -> Vec<OnboardingField> {
        STEPS
            .get(step)
            .map(|s| s.fields)
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|field| self.data.get(*field).trim().is_empty())
            .collect()
    }

    pub fn validate_step(&self, step: usize) -> bool {
        self.missing_fields(step).is_empty()
    }

    pub fn next(&mut self) -> StepOutcome {
        if self.step + 1 >= STEPS.len() {
            return StepOutcome::ReadyToComplete;
        }
        let missing = self.missing_fields(self.step);
        if !missing.is_empty() {
            return StepOutcome::MissingFields(missing);
        }
        self.step += 1;
        StepOutcome::Advanced(self.step)
    }

    pub fn back(&mut self) {
        self.step = self.step.saturating_sub(1);
    }

    /// Creates the profile for the signed-in user.
    pub async fn complete<A, S>(&self, auth: &A, store: &S) -> Result<UserProfile>
    where
        A: AuthProvider,
        S: RecordStore,
    {
        if self.step + 1 < STEPS.len() {
            bail!(
                "onboarding is on step {} of {}",
                self.step + 1,
                STEPS.len()
            );
        }
        let user = auth.current_user().await?;
        let now = Utc::now();
        let profile = UserProfile {
            id: String::new(),
            name: self.data.name.clone(),
            phone: self.data.phone.clone(),
            email: user.email.clone(),
            address: self.data.address.clone(),
            preferences: Preferences {
                pizza_place: self.data.pizza_place.clone(),
                doctor: self.data.doctor.clone(),
                preferred_time: self.data.preferred_time.clone(),
                payment_method: DEFAULT_PAYMENT_METHOD.to_string(),
            },
            emergency_contact: self.data.emergency_contact.clone(),
            user_id: user.id.clone(),
            created_at: now,
            updated_at: now,
        };

        save_profile(store, &profile).await.inspect_err(|error| {
            emit_profile_save_error(&user.id, error);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{resolve_route, AppRoute, AuthState, MemoryAuthProvider, User};
    use crate::store::MemoryRecordStore;

    fn filled_wizard() -> OnboardingWizard {
        let mut wizard = OnboardingWizard::new();
        wizard.set_field(OnboardingField::Name, "Sam Rivera");
        wizard.set_field(OnboardingField::EmergencyContact, "Alex Rivera");
        wizard.set_field(OnboardingField::Phone, "+1 (555) 123-4567");
        wizard.set_field(OnboardingField::Address, "12 Elm St");
        wizard.set_field(OnboardingField::PizzaPlace, "Tony's Pizza");
        wizard.set_field(OnboardingField::Doctor, "Dr. Patel");
        wizard
    }

    #[test]
    fn test_blank_fields_block_advancing() {
        let mut wizard = OnboardingWizard::new();
        assert_eq!(wizard.data().preferred_time, "morning");

        wizard.set_field(OnboardingField::Name, "Sam");
        wizard.set_field(OnboardingField::EmergencyContact, "   ");
        assert_eq!(
            wizard.next(),
            StepOutcome::MissingFields(vec![OnboardingField::EmergencyContact])
        );
        assert_eq!(wizard.current_step(), 0);

        wizard.set_field(OnboardingField::EmergencyContact, "Alex");
        assert_eq!(wizard.next(), StepOutcome::Advanced(1));
    }

    #[test]
    fn test_final_step_has_no_fields_and_back_stops_at_zero() {
        let mut wizard = filled_wizard();
        assert!(wizard.validate_step(3));
        assert!(wizard.validate_step(99));
        assert!(wizard.choose_preferred_time("midnight").is_err());
        wizard.choose_preferred_time("evening").expect("known slot");
        assert_eq!(wizard.data().preferred_time, "evening");

        for expected in 1..4 {
            assert_eq!(wizard.next(), StepOutcome::Advanced(expected));
        }
        assert_eq!(wizard.step().title, "All Set!");
        assert_eq!(wizard.next(), StepOutcome::ReadyToComplete);

        for _ in 0..6 {
            wizard.back();
        }
        assert_eq!(wizard.current_step(), 0);
    }

    #[tokio::test]
    async fn test_complete_creates_profile_and_unlocks_home() {
        let user = User {
            id: "user_1".to_string(),
            email: "sam@example.com".to_string(),
            display_name: None,
        };
        let auth = MemoryAuthProvider::signed_in(user.clone());
        let store = MemoryRecordStore::new();
        let mut wizard = filled_wizard();

        assert!(wizard.complete(&auth, &store).await.is_err());
        while let StepOutcome::Advanced(_) = wizard.next() {}

        let profile = wizard.complete(&auth, &store).await.expect("profile saved");
        assert_eq!(profile.email, "sam@example.com");
        assert_eq!(profile.user_id, "user_1");
        assert_eq!(profile.preferences.payment_method, "card");
        assert_eq!(profile.preferences.preferred_time, "morning");

        let route = resolve_route(&AuthState::signed_in(user), &store).await;
        assert_eq!(route, AppRoute::Home);
    }

    #[tokio::test]
    async fn test_complete_requires_signed_in_user() {
        let auth = MemoryAuthProvider::new(User {
            id: "user_1".to_string(),
            email: "sam@example.com".to_string(),
            display_name: None,
        });
        auth.restore();
        let store = MemoryRecordStore::new();
        let mut wizard = filled_wizard();
        while let StepOutcome::Advanced(_) = wizard.next() {}

        assert!(wizard.complete(&auth, &store).await.is_err());
    }
}

use crate::profile::UserProfile;
use crate::prompt::CallContext;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

const CUSTOM_TEMPLATE_COLOR: &str = "#007AFF";

/// Reusable opening script for a kind of call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTemplate {
    pub id: u32,
    pub title: String,
    pub category: String,
    pub description: String,
    /// Opening lines with `[PLACEHOLDER]` markers.
    pub script: String,
    pub color: String,
}

/// Editable fields of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDraft {
    pub title: String,
    pub category: String,
    pub description: String,
    pub script: String,
}

impl From<&CallTemplate> for TemplateDraft {
    fn from(template: &CallTemplate) -> Self {
        Self {
            title: template.title.clone(),
            category: template.category.clone(),
            description: template.description.clone(),
            script: template.script.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateBook {
    templates: Vec<CallTemplate>,
}

impl TemplateBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let defaults = [
            (
                "Pizza Order",
                "Food",
                "Order pizza with your preferences",
                "Hi, I'd like to place an order for delivery. I'll have one large pepperoni pizza and a Caesar salad. My address is [ADDRESS] and phone number is [PHONE].",
                "#FF6B6B",
            ),
            (
                "Doctor Appointment",
                "Healthcare",
                "Check or schedule medical appointments",
                "Hello, I'm calling to check on my upcoming appointment with Dr. [DOCTOR_NAME]. My name is [NAME] and my date of birth is [DOB].",
                "#4ECDC4",
            ),
            (
                "Restaurant Reservation",
                "Dining",
                "Make restaurant reservations",
                "Hi, I'd like to make a reservation for [PARTY_SIZE] people for [DATE] at [TIME]. My name is [NAME] and my phone number is [PHONE].",
                "#45B7D1",
            ),
            (
                "Customer Service",
                "Support",
                "Handle customer service inquiries",
                "Hello, I'm calling regarding my account. My name is [NAME] and my account number is [ACCOUNT_NUMBER]. I need help with [ISSUE_DESCRIPTION].",
                "#96CEB4",
            ),
        ];

        let templates = defaults
            .into_iter()
            .zip(1..)
            .map(
                |((title, category, description, script, color), id)| CallTemplate {
                    id,
                    title: title.to_string(),
                    category: category.to_string(),
                    description: description.to_string(),
                    script: script.to_string(),
                    color: color.to_string(),
                },
            )
            .collect();
        Self { templates }
    }

    pub fn list(&self) -> &[CallTemplate] {
        &self.templates
    }

    pub fn get(&self, id: u32) -> Option<&CallTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Updates template `editing` in place, or adds a new template with the
    /// next free id.
    pub fn save(
        &mut self,
        draft: TemplateDraft,
        editing: Option<u32>,
    ) -> Result<&CallTemplate> {
        let index = match editing {
            Some(id) => {
                let index = self
                    .templates
                    .iter()
                    .position(|t| t.id == id)
                    .ok_or_else(|| anyhow!("template {id} does not exist"))?;
                let template = &mut self.templates[index];
                template.title = draft.title;
                template.category = draft.category;
                template.description = draft.description;
                template.script = draft.script;
                index
            }
            None => {
                let id = self.templates.iter().map(|t| t.id).max().map_or(1, |max| max + 1);
                self.templates.push(CallTemplate {
                    id,
                    title: draft.title,
                    category: draft.category,
                    description: draft.description,
                    script: draft.script,
                    color: CUSTOM_TEMPLATE_COLOR.to_string(),
                });
                self.templates.len() - 1
            }
        };
        Ok(&self.templates[index])
    }

    pub fn delete(&mut self, id: u32) -> Option<CallTemplate> {
        let index = self.templates.iter().position(|t| t.id == id)?;
        Some(self.templates.remove(index))
    }
}

/// Fills the placeholders a profile can answer. Anything else, such as
/// `[DOB]` or `[PARTY_SIZE]`, is left for the user.
pub fn render_script(template: &CallTemplate, profile: &UserProfile) -> String {
    [
        ("[NAME]", profile.name.as_str()),
        ("[PHONE]", profile.phone.as_str()),
        ("[ADDRESS]", profile.address.as_str()),
        ("[DOCTOR_NAME]", profile.preferences.doctor.as_str()),
    ]
    .into_iter()
    .fold(template.script.clone(), |script, (marker, value)| {
        script.replace(marker, value)
    })
}

impl CallContext {
    /// Context for a call started from `template`.
    pub fn from_template(template: &CallTemplate, business_name: &str) -> Self {
        let counterparty_label = match template.category.as_str() {
            "Food" | "Dining" => "Restaurant",
            "Healthcare" => "Clinic",
            _ => "Representative",
        };
        Self {
            business_name: business_name.to_string(),
            business_phone: String::new(),
            counterparty_label: counterparty_label.to_string(),
            task: format!(
                "talking to {business_name} about a {}",
                template.title.to_lowercase()
            ),
            details: format!(
                "{}. Your opening script was: \"{}\"",
                template.description, template.script
            ),
        }
    }
}

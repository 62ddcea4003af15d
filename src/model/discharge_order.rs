//! `DischargeOrder` and its optional `CallTemplate` — the template source
//! consumed by the Scheduler's "Generation from templates" path
//! (`spec.md` §4.C). Named in `SPEC_FULL.md` §3 as a supplement: `spec.md`
//! describes the generation algorithm but not the shape of its input.

use serde::{Deserialize, Serialize};

use super::call_type::CallType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTemplate {
    /// A string from the timing grammar in `spec.md` §3.
    pub timing: String,
    pub call_type: CallType,
    pub priority: u8,
    /// Template text with `{patient_name}` / `{discharge_order}` style
    /// placeholders, filled in by the Scheduler.
    pub prompt_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DischargeOrder {
    pub id: String,
    pub label: String,
    pub discharge_order: String,
    pub call_template: Option<CallTemplate>,
}

impl DischargeOrder {
    pub fn new(id: impl Into<String>, label: impl Into<String>, discharge_order: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            discharge_order: discharge_order.into(),
            call_template: None,
        }
    }

    pub fn with_call_template(mut self, template: CallTemplate) -> Self {
        self.call_template = Some(template);
        self
    }

    /// Fill `prompt_template` placeholders with this order's and the
    /// patient's fields.
    pub fn render_prompt(&self, template: &str, patient_name: &str) -> String {
        template
            .replace("{patient_name}", patient_name)
            .replace("{discharge_order}", &self.discharge_order)
    }
}

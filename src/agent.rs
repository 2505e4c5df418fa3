//! Outbound call console for call-center agents.

use clap::Subcommand;
use serde_json::Value;

use crate::api::types::{CallOutcome, Lead};
use crate::api::CallCenterApi;
use crate::config::AppConfig;
use crate::error::{FlowError, Result};
use crate::logging::{mask_name, mask_phone};

#[derive(Subcommand, Debug)]
pub enum AgentAction {
    /// List leads waiting for a call
    Targets,
    /// List leads already handled
    History,
    /// Record the outcome of a call
    Result {
        /// Lead identifier as shown by `targets`
        #[arg(long)]
        lead_id: String,
        #[arg(long, value_enum)]
        status: CallOutcome,
        #[arg(long)]
        customer_name: Option<String>,
    },
}

/// Log the agent in, then run one action.
pub async fn run(config: &AppConfig, username: &str, password: &str, action: AgentAction) -> Result<()> {
    let api = CallCenterApi::new(reqwest::Client::new(), config.callcenter_api_url.clone());
    let agent = api.login(username, password).await?;

    match action {
        AgentAction::Targets => print_leads("Call targets", &api.targets().await?),
        AgentAction::History => print_leads("Call history", &api.history().await?),
        AgentAction::Result {
            lead_id,
            status,
            customer_name,
        } => {
            if lead_id.trim().is_empty() {
                return Err(FlowError::validation("A lead id is required."));
            }
            api.submit_result(&parse_lead_id(&lead_id), customer_name.as_deref(), status, &agent)
                .await?;
            println!("Recorded {:?} for lead {} as {}", status, lead_id, agent);
        }
    }
    Ok(())
}

/// Numeric ids are sent as numbers, anything else as a string.
fn parse_lead_id(raw: &str) -> Value {
    match raw.trim().parse::<i64>() {
        Ok(id) => Value::from(id),
        Err(_) => Value::String(raw.trim().to_string()),
    }
}

fn lead_line(lead: &Lead) -> String {
    let id = match &lead.lead_id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    format!(
        "{:<8} {:<10} {:<15} {:<16} {}",
        id,
        mask_name(&lead.name),
        mask_phone(&lead.phone),
        lead.requested_product_type.as_deref().unwrap_or("-"),
        lead.status.as_deref().unwrap_or("-")
    )
}

fn print_leads(title: &str, leads: &[Lead]) {
    println!("{} ({})", title, leads.len());
    for lead in leads {
        println!("{}", lead_line(lead));
    }
}

//! Action queries and commands.
//!
//! Provides list, complete, programme and move operations against the
//! actions API.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ActionCommands {
    /// List available incomplete actions for the authenticated trainee
    List,

    /// Mark one of the authenticated trainee's actions as completed
    Complete {
        /// Action ID
        action_id: String,
    },

    /// List all actions for a trainee's programme membership (internal API)
    Programme {
        /// Trainee ID
        trainee_id: String,

        /// Programme membership ID
        programme_id: String,
    },

    /// Move all actions from one trainee to another (internal API)
    Move {
        /// Trainee ID to move actions from
        from_trainee_id: String,

        /// Trainee ID to move actions to
        to_trainee_id: String,
    },
}

/// Action shape as returned by the API.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionDto {
    id: String,
    #[serde(rename = "type")]
    action_type: String,
    trainee_id: String,
    source_reference: SourceRefDto,
    available_from: Option<String>,
    due_by: Option<String>,
    completed_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SourceRefDto {
    id: String,
    kind: String,
}

/// Row shape for table output.
#[derive(Tabled, Serialize)]
struct ActionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    action_type: String,
    #[tabled(rename = "Reference")]
    reference: String,
    #[tabled(rename = "Due By")]
    due_by: String,
    #[tabled(rename = "Completed")]
    completed: String,
}

impl From<&ActionDto> for ActionRow {
    fn from(action: &ActionDto) -> Self {
        Self {
            id: action.id.clone(),
            action_type: action.action_type.clone(),
            reference: format!(
                "{} ({})",
                action.source_reference.id, action.source_reference.kind
            ),
            due_by: action.due_by.clone().unwrap_or_else(|| "-".to_string()),
            completed: action
                .completed_at
                .clone()
                .unwrap_or_else(|| "no".to_string()),
        }
    }
}

pub async fn execute(cmd: ActionCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        ActionCommands::List => {
            let actions: Vec<ActionDto> = client.get("/api/action").await?;
            print_actions(&actions, format);
        }
        ActionCommands::Complete { action_id } => {
            let action: ActionDto = client
                .post(&format!("/api/action/{}/complete", action_id))
                .await?;
            output::print_success(&format!("Action {} completed", action.id));
            if !format.is_table() {
                output::print_serialized(&action, format);
            }
        }
        ActionCommands::Programme {
            trainee_id,
            programme_id,
        } => {
            let actions: Vec<ActionDto> = client
                .get(&format!("/api/action/{}/{}", trainee_id, programme_id))
                .await?;
            print_actions(&actions, format);
        }
        ActionCommands::Move {
            from_trainee_id,
            to_trainee_id,
        } => {
            let moved: bool = client
                .patch(&format!(
                    "/api/action/move/{}/to/{}",
                    from_trainee_id, to_trainee_id
                ))
                .await?;
            if moved {
                output::print_success(&format!(
                    "Actions moved from {} to {}",
                    from_trainee_id, to_trainee_id
                ));
            }
        }
    }

    Ok(())
}

fn print_actions(actions: &[ActionDto], format: OutputFormat) {
    if format.is_table() {
        let rows: Vec<ActionRow> = actions.iter().map(ActionRow::from).collect();
        output::print_rows(&rows, format);
    } else {
        output::print_serialized(&actions, format);
    }
}

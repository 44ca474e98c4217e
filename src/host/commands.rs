// Line-oriented JSON command protocol.
//
// One request per line in, one response per line out:
//   {"command": "record_message", "conversation_id": 1, ...}
//   {"ok": true, "data": {...}}  or  {"ok": false, "error": "..."}

use crate::core::moderation::{
    BlockingService, CaseFilter, CaseId, CaseStatus, ModerationConfig, ModerationService,
    ModerationStore, PageRequest, ResolutionAction, RiskLevel,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum HostCommand {
    RecordMessage {
        conversation_id: u64,
        message_id: u64,
        sender_id: u64,
        receiver_id: u64,
        text: String,
    },
    Resolve {
        case_id: CaseId,
        resolver_id: u64,
        action: ResolutionAction,
        reason: String,
        #[serde(default)]
        notes: Option<String>,
    },
    Dismiss {
        case_id: CaseId,
        resolver_id: u64,
        reason: String,
    },
    ListCases {
        #[serde(default)]
        status: Option<CaseStatus>,
        #[serde(default)]
        risk_level: Option<RiskLevel>,
        #[serde(default)]
        page: u32,
        #[serde(default)]
        page_size: Option<u32>,
    },
    GetCase {
        case_id: CaseId,
    },
    BlockUser {
        blocker_id: u64,
        target_id: u64,
        #[serde(default)]
        reason: String,
    },
    UnblockUser {
        blocker_id: u64,
        target_id: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HostResponse {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Routes host commands to the moderation and blocking services.
pub struct CommandHandler<S: ModerationStore + Clone> {
    moderation: ModerationService<S>,
    blocking: BlockingService<S>,
}

impl<S: ModerationStore + Clone> CommandHandler<S> {
    pub fn new(store: S, config: ModerationConfig) -> Self {
        Self {
            moderation: ModerationService::new(store.clone(), config),
            blocking: BlockingService::new(store),
        }
    }

    pub fn moderation(&self) -> &ModerationService<S> {
        &self.moderation
    }

    pub async fn execute(&self, command: HostCommand) -> anyhow::Result<Value> {
        let data = match command {
            HostCommand::RecordMessage {
                conversation_id,
                message_id,
                sender_id,
                receiver_id,
                text,
            } => {
                let case_id = self
                    .moderation
                    .record_suspicious_message(
                        conversation_id,
                        message_id,
                        sender_id,
                        receiver_id,
                        &text,
                    )
                    .await?;
                json!({ "case_id": case_id })
            }
            HostCommand::Resolve {
                case_id,
                resolver_id,
                action,
                reason,
                notes,
            } => {
                let case = self
                    .moderation
                    .resolve(case_id, resolver_id, action, &reason, notes)
                    .await?;
                serde_json::to_value(case)?
            }
            HostCommand::Dismiss {
                case_id,
                resolver_id,
                reason,
            } => {
                let case = self.moderation.dismiss(case_id, resolver_id, &reason).await?;
                serde_json::to_value(case)?
            }
            HostCommand::ListCases {
                status,
                risk_level,
                page,
                page_size,
            } => {
                let page = self
                    .moderation
                    .list_cases(
                        CaseFilter { status, risk_level },
                        PageRequest { page, page_size },
                    )
                    .await?;
                serde_json::to_value(page)?
            }
            HostCommand::GetCase { case_id } => {
                serde_json::to_value(self.moderation.get_case(case_id).await?)?
            }
            HostCommand::BlockUser {
                blocker_id,
                target_id,
                reason,
            } => {
                let created = self.blocking.block_user(blocker_id, target_id, &reason).await?;
                json!({ "created": created })
            }
            HostCommand::UnblockUser {
                blocker_id,
                target_id,
            } => {
                let removed = self.blocking.unblock_user(blocker_id, target_id).await?;
                json!({ "removed": removed })
            }
        };
        Ok(data)
    }

    /// Parse and run one request line. Never fails; errors become responses.
    pub async fn handle_line(&self, line: &str) -> HostResponse {
        let command: HostCommand = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed command");
                return HostResponse::failure(format!("Malformed command: {e}"));
            }
        };

        tracing::debug!(?command, "Handling command");
        match self.execute(command).await {
            Ok(data) => HostResponse::success(data),
            Err(e) => {
                tracing::warn!(error = %e, "Command failed");
                HostResponse::failure(e.to_string())
            }
        }
    }
}

/// Serve commands from `reader` until EOF, writing one response per line.
pub async fn serve<S, R, W>(
    handler: &CommandHandler<S>,
    reader: R,
    mut writer: W,
) -> anyhow::Result<()>
where
    S: ModerationStore + Clone,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let response = handler.handle_line(line).await;
        let mut encoded = serde_json::to_string(&response)?;
        encoded.push('\n');
        writer.write_all(encoded.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

//! MCP server: tool definitions using rmcp macros.
//!
//! Defines `GdbMcpServer`, exposing one thin tool per core operation (§6,
//! §10). Each handler builds a GDB command string (or calls straight
//! through for the raw passthrough tools), calls `execute`/`execute_mi` on
//! the resolved session, and shapes the result into tool JSON -- it does
//! not duplicate any orchestration logic, which all lives in `session.rs`
//! and `manager.rs`.

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars;
use rmcp::tool;
use rmcp::tool_handler;
use rmcp::tool_router;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde::Serialize;

use crate::manager::SessionManager;
use crate::mi::MiRecord;
use crate::output;

/// Cap applied to raw GDB output before it's handed back to the agent.
/// GDB commands like `info functions` or a deep core-dump backtrace can
/// produce thousands of lines; windowing keeps the reply LLM-sized while
/// `total_lines`/`truncated` tell the agent whether more was cut.
const MAX_RAW_OUTPUT_LINES: usize = 500;

// ---------------------------------------------------------------------------
// Parameter structs (deserialized from MCP tool call arguments)
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct CreateSessionParams {
    /// Path to the GDB binary. Defaults to `gdb` resolved via `$PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gdb_path: Option<String>,
    /// Working directory for the GDB subprocess.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Per-command timeout in milliseconds. Defaults to the server setting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct SessionIdParams {
    /// ID of the session, as returned by create_session.
    pub session_id: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct LoadProgramParams {
    pub session_id: String,
    /// Path to the executable (or core file) to load.
    pub path: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct SetBreakpointParams {
    pub session_id: String,
    /// Location expression GDB accepts for `break`, e.g. `main`,
    /// `file.c:42`, or `*0x4000`.
    pub location: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct DeleteBreakpointParams {
    pub session_id: String,
    /// Breakpoint number, as reported by set_breakpoint.
    pub number: u32,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct StepParams {
    pub session_id: String,
    /// Number of lines/instructions to step. Defaults to 1.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct EvaluateExpressionParams {
    pub session_id: String,
    /// A GDB expression, e.g. `argc`, `*ptr`, `arr[3]`.
    pub expression: String,
}

#[derive(Debug, serde::Deserialize, schemars::JsonSchema)]
pub struct ExecuteRawParams {
    pub session_id: String,
    /// An opaque GDB console command, sent verbatim with a trailing newline.
    pub command: String,
}

// ---------------------------------------------------------------------------
// Result structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct RawResult {
    session_id: String,
    output_head: Vec<String>,
    output_tail: Vec<String>,
    output_error_lines: Vec<String>,
    total_lines: usize,
    truncated: bool,
}

fn raw_result(session_id: String, raw: &str) -> RawResult {
    // The inferior program can color its own stdout/stderr, which GDB
    // relays verbatim through console-stream records; strip it here so the
    // agent sees plain text rather than escape codes.
    let lines: Vec<String> = raw.lines().map(output::strip_ansi).collect();
    let windowed = output::window(&lines, MAX_RAW_OUTPUT_LINES);
    RawResult {
        session_id,
        output_head: windowed.head,
        output_tail: windowed.tail,
        output_error_lines: windowed.error_lines,
        total_lines: windowed.total_lines,
        truncated: windowed.truncated,
    }
}

#[derive(Debug, Clone, Serialize)]
struct RecordsResult {
    session_id: String,
    records: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
struct TerminateResult {
    session_id: String,
    terminated: bool,
}

fn records_to_json(records: Vec<MiRecord>) -> Vec<serde_json::Value> {
    records
        .into_iter()
        .map(|r| match r {
            MiRecord::Result { class, token, body } => serde_json::json!({
                "kind": "result",
                "class": format!("{class:?}").to_lowercase(),
                "token": token,
                "body": body,
            }),
            MiRecord::ExecAsync { class, token, body } => serde_json::json!({
                "kind": "exec-async",
                "class": class,
                "token": token,
                "body": body,
            }),
            MiRecord::StatusAsync { class, token, body } => serde_json::json!({
                "kind": "status-async",
                "class": class,
                "token": token,
                "body": body,
            }),
            MiRecord::NotifyAsync { class, token, body } => serde_json::json!({
                "kind": "notify-async",
                "class": class,
                "token": token,
                "body": body,
            }),
            MiRecord::ConsoleStream { text } => serde_json::json!({"kind": "console", "text": text}),
            MiRecord::TargetStream { text } => serde_json::json!({"kind": "target", "text": text}),
            MiRecord::LogStream { text } => serde_json::json!({"kind": "log", "text": text}),
            MiRecord::Prompt => serde_json::json!({"kind": "prompt"}),
            MiRecord::Unknown { raw } => serde_json::json!({"kind": "unknown", "raw": raw}),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

/// The GDB-over-MCP bridge server.
///
/// Holds a [`SessionManager`] and nothing else -- every tool handler is a
/// thin adaptor translating one MCP call into one manager/session call.
#[derive(Clone)]
pub struct GdbMcpServer {
    sessions: SessionManager,
    tool_router: ToolRouter<GdbMcpServer>,
}

impl GdbMcpServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: SessionManager::new(),
            tool_router: Self::tool_router(),
        }
    }
}

impl Default for GdbMcpServer {
    fn default() -> Self {
        Self::new()
    }
}

fn json_content<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("JSON serialization error: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn err_result(msg: impl std::fmt::Display) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

/// Quote a filesystem path for embedding in a GDB console command, the way
/// `file "<path>"` expects -- GDB uses plain double quotes, not shell quoting.
fn quote_path(path: &str) -> String {
    format!("\"{}\"", path.replace('\\', "\\\\").replace('"', "\\\""))
}

#[tool_router]
impl GdbMcpServer {
    #[tool(
        description = "Create a new GDB debugging session (allocates an id; the subprocess is not spawned yet). Call start_session next to actually launch gdb."
    )]
    async fn create_session(
        &self,
        Parameters(params): Parameters<CreateSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(gdb_path = ?params.gdb_path, "create_session");
        match self
            .sessions
            .create(params.gdb_path, params.working_directory, params.timeout_ms)
            .await
        {
            Ok(summary) => json_content(&summary),
            Err(e) => err_result(e),
        }
    }

    #[tool(
        description = "Spawn the GDB subprocess for a previously created session and wait for it to reach the Ready state (the first (gdb) prompt)."
    )]
    async fn start_session(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, "start_session");
        match self.sessions.start(&params.session_id).await {
            Ok(summary) => json_content(&summary),
            Err(e) => err_result(e),
        }
    }

    #[tool(
        description = "Load an executable (or core file) into a session via `file \"<path>\"`. Must be called on a Ready session before setting breakpoints or running."
    )]
    async fn load_program(
        &self,
        Parameters(params): Parameters<LoadProgramParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, path = %params.path, "load_program");
        let session = match self.sessions.get_session(&params.session_id).await {
            Some(s) => s,
            None => return err_result(format!("no session with id '{}'", params.session_id)),
        };
        let command = format!("file {}", quote_path(&params.path));
        match session.execute(&command).await {
            Ok(output) => {
                session.set_program_path(Some(params.path.clone()));
                json_content(&raw_result(params.session_id, &output))
            }
            Err(e) => err_result(e),
        }
    }

    #[tool(
        description = "Set a breakpoint at a location (e.g. `main`, `file.c:42`, `*0x4000`) via `break`."
    )]
    async fn set_breakpoint(
        &self,
        Parameters(params): Parameters<SetBreakpointParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, location = %params.location, "set_breakpoint");
        let session = match self.sessions.get_session(&params.session_id).await {
            Some(s) => s,
            None => return err_result(format!("no session with id '{}'", params.session_id)),
        };
        let command = format!("break {}", params.location);
        match session.execute_mi(&command).await {
            Ok(records) => json_content(&RecordsResult {
                session_id: params.session_id,
                records: records_to_json(records),
            }),
            Err(e) => err_result(e),
        }
    }

    #[tool(description = "Delete a breakpoint by number via `delete`.")]
    async fn delete_breakpoint(
        &self,
        Parameters(params): Parameters<DeleteBreakpointParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, number = params.number, "delete_breakpoint");
        let session = match self.sessions.get_session(&params.session_id).await {
            Some(s) => s,
            None => return err_result(format!("no session with id '{}'", params.session_id)),
        };
        let command = format!("delete {}", params.number);
        match session.execute(&command).await {
            Ok(output) => json_content(&raw_result(params.session_id, &output)),
            Err(e) => err_result(e),
        }
    }

    #[tool(description = "Resume execution in a stopped session via `continue`.")]
    async fn continue_execution(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, "continue_execution");
        let session = match self.sessions.get_session(&params.session_id).await {
            Some(s) => s,
            None => return err_result(format!("no session with id '{}'", params.session_id)),
        };
        match session.execute_mi("continue").await {
            Ok(records) => json_content(&RecordsResult {
                session_id: params.session_id,
                records: records_to_json(records),
            }),
            Err(e) => err_result(e),
        }
    }

    #[tool(
        description = "Step one or more source lines, stepping into calls, via `step [count]`."
    )]
    async fn step_line(
        &self,
        Parameters(params): Parameters<StepParams>,
    ) -> Result<CallToolResult, McpError> {
        step_tool(&self.sessions, params, "step").await
    }

    #[tool(
        description = "Step one or more machine instructions via `stepi [count]`."
    )]
    async fn step_instruction(
        &self,
        Parameters(params): Parameters<StepParams>,
    ) -> Result<CallToolResult, McpError> {
        step_tool(&self.sessions, params, "stepi").await
    }

    #[tool(description = "Retrieve the current call stack via `-stack-list-frames`.")]
    async fn get_backtrace(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, "get_backtrace");
        let session = match self.sessions.get_session(&params.session_id).await {
            Some(s) => s,
            None => return err_result(format!("no session with id '{}'", params.session_id)),
        };
        match session.execute_mi("-stack-list-frames").await {
            Ok(records) => json_content(&RecordsResult {
                session_id: params.session_id,
                records: records_to_json(records),
            }),
            Err(e) => err_result(e),
        }
    }

    #[tool(
        description = "Retrieve the local variables of the current frame via `-stack-list-locals 1` (with values)."
    )]
    async fn get_locals(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, "get_locals");
        let session = match self.sessions.get_session(&params.session_id).await {
            Some(s) => s,
            None => return err_result(format!("no session with id '{}'", params.session_id)),
        };
        match session.execute_mi("-stack-list-locals 1").await {
            Ok(records) => json_content(&RecordsResult {
                session_id: params.session_id,
                records: records_to_json(records),
            }),
            Err(e) => err_result(e),
        }
    }

    #[tool(
        description = "Evaluate a GDB expression in the current frame via `-data-evaluate-expression`."
    )]
    async fn evaluate_expression(
        &self,
        Parameters(params): Parameters<EvaluateExpressionParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, expression = %params.expression, "evaluate_expression");
        let session = match self.sessions.get_session(&params.session_id).await {
            Some(s) => s,
            None => return err_result(format!("no session with id '{}'", params.session_id)),
        };
        let command = format!("-data-evaluate-expression {}", quote_path(&params.expression));
        match session.execute_mi(&command).await {
            Ok(records) => json_content(&RecordsResult {
                session_id: params.session_id,
                records: records_to_json(records),
            }),
            Err(e) => err_result(e),
        }
    }

    #[tool(
        description = "Send an opaque GDB console command verbatim and return the raw concatenated output. The direct, unopinionated passthrough -- use the dedicated tools above when one fits."
    )]
    async fn execute_raw(
        &self,
        Parameters(params): Parameters<ExecuteRawParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, command = %params.command, "execute_raw");
        let session = match self.sessions.get_session(&params.session_id).await {
            Some(s) => s,
            None => return err_result(format!("no session with id '{}'", params.session_id)),
        };
        match session.execute(&params.command).await {
            Ok(output) => json_content(&raw_result(params.session_id, &output)),
            Err(e) => err_result(e),
        }
    }

    #[tool(description = "List every session the manager currently tracks, with state and uptime.")]
    async fn list_sessions(&self) -> Result<CallToolResult, McpError> {
        let sessions = self.sessions.list().await;
        json_content(&sessions)
    }

    #[tool(description = "Fetch a single session's current summary (state, gdb_path, program_path, uptime).")]
    async fn get_session(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.sessions.get(&params.session_id).await {
            Some(summary) => json_content(&summary),
            None => err_result(format!("no session with id '{}'", params.session_id)),
        }
    }

    #[tool(
        description = "Terminate a session's GDB subprocess (graceful `quit` with a force-kill grace period) and remove it from the manager."
    )]
    async fn terminate_session(
        &self,
        Parameters(params): Parameters<SessionIdParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %params.session_id, "terminate_session");
        match self.sessions.remove(&params.session_id).await {
            Ok(terminated) => json_content(&TerminateResult {
                session_id: params.session_id,
                terminated,
            }),
            Err(e) => err_result(e),
        }
    }
}

async fn step_tool(
    sessions: &SessionManager,
    params: StepParams,
    verb: &str,
) -> Result<CallToolResult, McpError> {
    tracing::info!(session = %params.session_id, verb, count = ?params.count, "step");
    let session = match sessions.get_session(&params.session_id).await {
        Some(s) => s,
        None => return err_result(format!("no session with id '{}'", params.session_id)),
    };
    let command = match params.count {
        Some(n) => format!("{verb} {n}"),
        None => verb.to_string(),
    };
    match session.execute_mi(&command).await {
        Ok(records) => json_content(&RecordsResult {
            session_id: params.session_id,
            records: records_to_json(records),
        }),
        Err(e) => err_result(e),
    }
}

#[tool_handler]
impl ServerHandler for GdbMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "gdb-mcp-bridge".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "This server bridges MCP tool calls to one or more GDB subprocesses speaking \
                 the GDB Machine Interface (MI).\n\n\
                 Typical flow: create_session, then start_session to spawn gdb and wait for \
                 the first prompt, then load_program to load the target binary. From there, \
                 set_breakpoint / continue_execution / step_line / step_instruction drive \
                 execution, and get_backtrace / get_locals / evaluate_expression inspect state. \
                 execute_raw is an escape hatch for any GDB command not covered by a dedicated \
                 tool. Call terminate_session when done with a session to free its subprocess.\n\n\
                 Every session is independent: breakpoints, the loaded program, and execution \
                 state do not cross session boundaries."
                    .to_string(),
            ),
        }
    }
}

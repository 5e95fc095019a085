use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session id used when the caller does not supply one.
pub const DEFAULT_SESSION_ID: &str = "default";

// ── Commands ───────────────────────────────────────────────────

/// Deterministic action recognized from chat text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    CreateUser,
    ListUsers,
    ShowUser,
    DeleteUser,
    CreateTraining,
    ListTrainings,
    Help,
    None,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::CreateUser => "CREATE_USER",
            Command::ListUsers => "LIST_USERS",
            Command::ShowUser => "SHOW_USER",
            Command::DeleteUser => "DELETE_USER",
            Command::CreateTraining => "CREATE_TRAINING",
            Command::ListTrainings => "LIST_TRAININGS",
            Command::Help => "HELP",
            Command::None => "NONE",
        }
    }

    /// Mutating commands are staged and only run after an explicit "yes".
    pub fn requires_confirmation(self) -> bool {
        matches!(self, Command::CreateUser | Command::DeleteUser)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Person attributes extracted from free text. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,
}

/// Training parameters extracted from free text. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<TrainingMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_person_name: Option<String>,
}

/// Payload shape per command. The command tag is derived from the variant,
/// so a payload can never be paired with the wrong tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandPayload {
    CreateUser(PersonAttrs),
    ListUsers,
    ShowUser { name: String },
    DeleteUser { name: String },
    CreateTraining(TrainingParams),
    ListTrainings,
    Help,
    None,
}

impl CommandPayload {
    pub fn command(&self) -> Command {
        match self {
            CommandPayload::CreateUser(_) => Command::CreateUser,
            CommandPayload::ListUsers => Command::ListUsers,
            CommandPayload::ShowUser { .. } => Command::ShowUser,
            CommandPayload::DeleteUser { .. } => Command::DeleteUser,
            CommandPayload::CreateTraining(_) => Command::CreateTraining,
            CommandPayload::ListTrainings => Command::ListTrainings,
            CommandPayload::Help => Command::Help,
            CommandPayload::None => Command::None,
        }
    }

    /// Generic key/value view of the payload, as carried on the wire.
    /// Absent fields are omitted; payload-less commands map to `{}`.
    pub fn to_wire(&self) -> serde_json::Map<String, serde_json::Value> {
        let value = match self {
            CommandPayload::CreateUser(attrs) => serde_json::to_value(attrs),
            CommandPayload::CreateTraining(params) => serde_json::to_value(params),
            CommandPayload::ShowUser { name } | CommandPayload::DeleteUser { name } => {
                Ok(serde_json::json!({ "name": name }))
            }
            _ => Ok(serde_json::Value::Object(Default::default())),
        };
        match value {
            Ok(serde_json::Value::Object(map)) => map,
            _ => Default::default(),
        }
    }
}

/// Output of the pattern matcher for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCommand {
    pub payload: CommandPayload,
    /// The text the winning recognizer matched; empty for `None`.
    pub raw_match: String,
}

impl ParsedCommand {
    pub fn none() -> Self {
        Self { payload: CommandPayload::None, raw_match: String::new() }
    }

    pub fn command(&self) -> Command {
        self.payload.command()
    }
}

// ── Pending actions ────────────────────────────────────────────

/// The payload shapes that can wait for confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingMutation {
    CreateUser(PersonAttrs),
    DeleteUser { name: String },
}

impl PendingMutation {
    pub fn command(&self) -> Command {
        match self {
            PendingMutation::CreateUser(_) => Command::CreateUser,
            PendingMutation::DeleteUser { .. } => Command::DeleteUser,
        }
    }
}

/// A staged mutating command awaiting a "yes" from the same session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub mutation: PendingMutation,
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(mutation: PendingMutation, preview: impl Into<String>, ttl: TimeDelta) -> Self {
        let created_at = Utc::now();
        Self {
            mutation,
            preview: preview.into(),
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn command(&self) -> Command {
        self.mutation.command()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ── Results ────────────────────────────────────────────────────

/// Outcome of a single executor operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub needs_confirmation: bool,
    /// Command that produced the result, reported back to the caller.
    pub command: Option<Command>,
    /// Set when the command must be handed to the plan generator.
    pub plan_request: Option<PlanRequest>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into(), ..Default::default() }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), ..Default::default() }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }
}

// ── Wire envelope ──────────────────────────────────────────────

/// One turn of prior conversation supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub content: String,
}

impl HistoryTurn {
    pub fn is_user(&self) -> bool {
        self.role.eq_ignore_ascii_case("user")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), history: Vec::new(), session_id: None }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn session_id(&self) -> &str {
        match self.session_id.as_deref() {
            Some(id) if !id.trim().is_empty() => id,
            _ => DEFAULT_SESSION_ID,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Markdown-formatted text for the user.
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub needs_confirmation: bool,
    pub success: bool,
}

impl ChatResponse {
    pub fn text(success: bool, response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            command: None,
            data: None,
            needs_confirmation: false,
            success,
        }
    }
}

impl From<CommandResult> for ChatResponse {
    fn from(result: CommandResult) -> Self {
        Self {
            response: result.message,
            command: result
                .command
                .filter(|_| result.success)
                .map(|c| c.as_str().to_string()),
            data: result.data,
            needs_confirmation: result.needs_confirmation,
            success: result.success,
        }
    }
}

// ── Domain records ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMode {
    /// Stations: each participant does a different exercise.
    Circuit,
    /// Everyone does the same exercise.
    Common,
}

impl TrainingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TrainingMode::Circuit => "circuit",
            TrainingMode::Common => "common",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "circuit" => Some(TrainingMode::Circuit),
            "common" => Some(TrainingMode::Common),
            _ => None,
        }
    }
}

/// A trainee as held by entity storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub goals: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields written when a trainee is created.
#[derive(Debug, Clone, PartialEq)]
pub struct NewClient {
    pub name: String,
    pub age: Option<u32>,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub goals: Option<String>,
}

/// Fully-defaulted input for the plan generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub difficulty: Difficulty,
    pub mode: TrainingMode,
    pub participant_count: u32,
    pub rest_time_secs: u32,
    pub warmup_count: u32,
    pub main_count: u32,
    pub cooldown_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_person_name: Option<String>,
}

impl PlanRequest {
    /// Exercises expected in the main part: one station per participant in
    /// circuit mode, the configured count otherwise.
    pub fn main_part_size(&self) -> u32 {
        match self.mode {
            TrainingMode::Circuit => self.participant_count,
            TrainingMode::Common => self.main_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_muscle_group")]
    pub muscle_group: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

fn default_muscle_group() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    #[serde(default)]
    pub warmup: Vec<Exercise>,
    pub main_part: Vec<Exercise>,
    #[serde(default)]
    pub cooldown: Vec<Exercise>,
    pub mode: TrainingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_minutes: Option<u32>,
}

impl TrainingPlan {
    pub fn exercise_count(&self) -> usize {
        self.warmup.len() + self.main_part.len() + self.cooldown.len()
    }
}

/// A generated plan kept in the training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: Uuid,
    pub difficulty: Difficulty,
    pub mode: TrainingMode,
    pub participant_count: u32,
    pub plan: TrainingPlan,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_tag_follows_payload() {
        assert_eq!(CommandPayload::Help.command(), Command::Help);
        assert_eq!(
            CommandPayload::DeleteUser { name: "Jan".into() }.command(),
            Command::DeleteUser
        );
        assert_eq!(ParsedCommand::none().command(), Command::None);
    }

    #[test]
    fn only_mutations_need_confirmation() {
        assert!(Command::CreateUser.requires_confirmation());
        assert!(Command::DeleteUser.requires_confirmation());
        for command in [Command::ListUsers, Command::ShowUser, Command::CreateTraining, Command::Help] {
            assert!(!command.requires_confirmation(), "{command}");
        }
        let staged = PendingMutation::DeleteUser { name: "Jan".into() };
        assert!(PendingAction::new(staged, String::new(), chrono::TimeDelta::minutes(5)).command().requires_confirmation());
    }

    #[test]
    fn wire_payload_omits_absent_fields() {
        let payload = CommandPayload::CreateUser(PersonAttrs {
            name: Some("Jan".into()),
            age: Some(30),
            ..Default::default()
        });
        let wire = payload.to_wire();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire["name"], "Jan");
        assert_eq!(wire["age"], 30);
        assert!(CommandPayload::ListUsers.to_wire().is_empty());
    }

    #[test]
    fn pending_action_expiry() {
        let action = PendingAction::new(
            PendingMutation::DeleteUser { name: "Jan".into() },
            "preview",
            TimeDelta::minutes(5),
        );
        assert!(!action.is_expired_at(Utc::now()));
        assert!(action.is_expired_at(action.expires_at + TimeDelta::seconds(1)));
        assert_eq!(action.command(), Command::DeleteUser);
    }

    #[test]
    fn session_id_defaults_when_blank() {
        assert_eq!(ChatRequest::new("x").session_id(), DEFAULT_SESSION_ID);
        assert_eq!(ChatRequest::new("x").with_session("  ").session_id(), DEFAULT_SESSION_ID);
        assert_eq!(ChatRequest::new("x").with_session("abc").session_id(), "abc");
    }

    #[test]
    fn chat_request_accepts_minimal_json() {
        let req: ChatRequest = serde_json::from_str(r#"{"message":"pomoc"}"#).unwrap();
        assert_eq!(req.message, "pomoc");
        assert!(req.history.is_empty());
        assert_eq!(req.session_id(), DEFAULT_SESSION_ID);
    }

    #[test]
    fn failed_result_hides_command_tag() {
        let resp: ChatResponse = CommandResult::fail("nope").with_command(Command::ShowUser).into();
        assert!(resp.command.is_none());
        assert!(!resp.success);
        let resp: ChatResponse = CommandResult::ok("ok").with_command(Command::ShowUser).into();
        assert_eq!(resp.command.as_deref(), Some("SHOW_USER"));
    }

    #[test]
    fn plan_parses_with_type_field() {
        let raw = r#"{"warmup":[],"main_part":[{"id":"m1","name":"Pompki","type":"main"}],"cooldown":[],"mode":"circuit"}"#;
        let plan: TrainingPlan = serde_json::from_str(raw).unwrap();
        assert_eq!(plan.main_part[0].kind, "main");
        assert_eq!(plan.main_part[0].muscle_group, "general");
        assert_eq!(plan.exercise_count(), 1);
    }
}

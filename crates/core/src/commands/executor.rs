use std::fmt::Display;
use std::sync::Arc;

use chrono::TimeDelta;
use serde_json::json;

use super::session::SessionStore;
use crate::config::TrenerCfg;
use crate::planner::plan_request;
use crate::storage::Storage;
use crate::types::{
    ClientRecord, Command, CommandPayload, CommandResult, NewClient, ParsedCommand, PendingAction,
    PendingMutation, PersonAttrs, TrainingParams,
};

/// Reply to a confirmation when the session has nothing staged.
pub const NOTHING_TO_CONFIRM: &str = "Nie mam nic do potwierdzenia.";

/// Name written when a creation request carried none.
pub const UNKNOWN_NAME: &str = "Nieznany";

/// Longest accepted confirmation window.
const MAX_PENDING_TTL_SECS: u64 = 7 * 24 * 3600;

const CONFIRM_HINT: &str = "Potwierdź: **tak** / **anuluj**";

const HELP_TEXT: &str = "**Dostępne komendy:**

**Podopieczni:**
- `dodaj podopiecznego Jan Kowalski, 30 lat, 80kg, 180cm, cel: schudnąć`
- `dodaj Jana 30 lat` *(skrócona forma)*
- `lista podopiecznych`
- `pokaż dane Jan`
- `usuń podopiecznego Jan`

**Treningi:**
- `wygeneruj trening, trudność: hard`
- `trening obwodowy dla 5 osób, 45 minut`
- `trening dla 5`
- `historia treningów`

**Inne:**
- `pomoc` - ta lista
- `tak` / `anuluj` - potwierdzenie lub anulowanie oczekującej akcji";

/// Runs parsed commands against storage. Mutations are only staged here;
/// they run from [`CommandExecutor::execute_pending`] after a confirmation.
#[derive(Clone)]
pub struct CommandExecutor {
    storage: Storage,
    sessions: Arc<dyn SessionStore>,
    cfg: Arc<TrenerCfg>,
    pending_ttl: TimeDelta,
}

impl CommandExecutor {
    pub fn new(storage: Storage, sessions: Arc<dyn SessionStore>, cfg: Arc<TrenerCfg>) -> Self {
        let secs = cfg.pending_ttl_secs.min(MAX_PENDING_TTL_SECS);
        let pending_ttl = TimeDelta::seconds(secs as i64);
        Self { storage, sessions, cfg, pending_ttl }
    }

    /// Override the confirmation window. A negative value stages actions that
    /// are already expired.
    pub fn with_pending_ttl(mut self, ttl: TimeDelta) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub async fn execute(&self, parsed: &ParsedCommand, session_id: &str) -> CommandResult {
        let command = parsed.command();
        let result = match &parsed.payload {
            CommandPayload::CreateUser(attrs) => self.stage_create(attrs, session_id),
            CommandPayload::ListUsers => self.list_users().await,
            CommandPayload::ShowUser { name } => self.show_user(name).await,
            CommandPayload::DeleteUser { name } => self.stage_delete(name, session_id),
            CommandPayload::CreateTraining(params) => self.delegate_training(params),
            CommandPayload::ListTrainings => self.list_trainings().await,
            CommandPayload::Help => CommandResult::ok(HELP_TEXT),
            CommandPayload::None => CommandResult::fail("Nieznana komenda"),
        };
        result.with_command(command)
    }

    /// Run the session's staged action, consuming it.
    pub async fn execute_pending(&self, session_id: &str) -> CommandResult {
        let Some(action) = self.sessions.take(session_id) else {
            return CommandResult::fail(NOTHING_TO_CONFIRM);
        };
        let command = action.command();
        tracing::info!(session_id, %command, "executing confirmed action");
        let result = match action.mutation {
            PendingMutation::CreateUser(attrs) => self.do_create(attrs).await,
            PendingMutation::DeleteUser { name } => self.do_delete(&name).await,
        };
        result.with_command(command)
    }

    fn stage(&self, session_id: &str, mutation: PendingMutation, preview: String) -> CommandResult {
        let action = PendingAction::new(mutation, preview.clone(), self.pending_ttl);
        debug_assert!(action.command().requires_confirmation());
        tracing::debug!(session_id, command = %action.command(), expires_at = %action.expires_at, "action staged");
        self.sessions.set(session_id, action);
        CommandResult { needs_confirmation: true, ..CommandResult::ok(preview) }
    }

    fn stage_create(&self, attrs: &PersonAttrs, session_id: &str) -> CommandResult {
        let preview = format!(
            "Dodać podopiecznego?\n\n\
             | Pole | Wartość |\n|------|---------|\n\
             | Imię | {} |\n| Wiek | {} |\n| Waga | {} |\n| Wzrost | {} |\n| Cel | {} |\n\n{CONFIRM_HINT}",
            attrs.name.as_deref().unwrap_or(UNKNOWN_NAME),
            or_dash(attrs.age),
            with_unit(attrs.weight, "kg"),
            with_unit(attrs.height, "cm"),
            attrs.goals.as_deref().unwrap_or("-"),
        );
        self.stage(session_id, PendingMutation::CreateUser(attrs.clone()), preview)
    }

    fn stage_delete(&self, name: &str, session_id: &str) -> CommandResult {
        let preview = format!(
            "Usunąć podopiecznego **{name}**?\n\n⚠️ Ta operacja jest nieodwracalna.\n\n{CONFIRM_HINT}"
        );
        self.stage(session_id, PendingMutation::DeleteUser { name: name.to_string() }, preview)
    }

    async fn do_create(&self, attrs: PersonAttrs) -> CommandResult {
        let client = NewClient {
            name: attrs.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            age: attrs.age,
            weight: attrs.weight,
            height: attrs.height,
            goals: attrs.goals,
        };
        match self.storage.create_client(&client).await {
            Ok(record) => CommandResult::ok(format!(
                "✓ Dodano podopiecznego **{}** (ID: {})",
                record.name, record.id
            ))
            .with_data(json!({ "user_id": record.id, "name": record.name })),
            Err(e) => {
                tracing::error!(error = %e, "client create failed on every storage tier");
                CommandResult::fail(format!("Nie udało się zapisać podopiecznego: {e}"))
            }
        }
    }

    async fn do_delete(&self, name: &str) -> CommandResult {
        match self.storage.delete_client_by_name(name).await {
            Ok(Some(record)) => CommandResult::ok(format!("✓ Usunięto podopiecznego **{}**", record.name))
                .with_data(json!({ "user_id": record.id, "name": record.name })),
            Ok(None) => CommandResult::fail(format!("Nie znaleziono: {name}")),
            Err(e) => {
                tracing::error!(error = %e, "client delete failed on every storage tier");
                CommandResult::fail(format!("Nie udało się usunąć podopiecznego: {e}"))
            }
        }
    }

    async fn list_users(&self) -> CommandResult {
        let clients = match self.storage.list_clients().await {
            Ok(clients) => clients,
            Err(e) => return CommandResult::fail(format!("Nie udało się pobrać listy podopiecznych: {e}")),
        };
        if clients.is_empty() {
            return CommandResult::ok("Brak zarejestrowanych podopiecznych.").with_data(json!({ "count": 0 }));
        }
        let mut table = String::from("| Imię | Wiek | Waga | Wzrost | Cel |\n|---|---|---|---|---|\n");
        for c in &clients {
            table.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                c.name,
                or_dash(c.age),
                with_unit(c.weight, "kg"),
                with_unit(c.height, "cm"),
                c.goals.as_deref().unwrap_or("-"),
            ));
        }
        CommandResult::ok(format!("**Lista podopiecznych ({}):**\n\n{table}", clients.len()))
            .with_data(json!({ "count": clients.len(), "clients": clients }))
    }

    async fn show_user(&self, name: &str) -> CommandResult {
        match self.storage.find_client(name).await {
            Ok(Some(client)) => {
                let data = serde_json::to_value(&client).unwrap_or_default();
                CommandResult::ok(profile(&client)).with_data(data)
            }
            Ok(None) => CommandResult::fail(format!("Nie znaleziono podopiecznego: **{name}**")),
            Err(e) => CommandResult::fail(format!("Nie udało się pobrać danych podopiecznego: {e}")),
        }
    }

    fn delegate_training(&self, params: &TrainingParams) -> CommandResult {
        let request = plan_request(params, &self.cfg);
        let data = json!({
            "delegate": "plan_generation",
            "params": serde_json::to_value(&request).unwrap_or_default(),
        });
        CommandResult { plan_request: Some(request), ..CommandResult::ok("").with_data(data) }
    }

    async fn list_trainings(&self) -> CommandResult {
        let limit = self.cfg.training_history_limit;
        let records = match self.storage.recent_trainings(limit).await {
            Ok(records) => records,
            Err(e) => return CommandResult::fail(format!("Nie udało się pobrać historii treningów: {e}")),
        };
        if records.is_empty() {
            return CommandResult::ok("**Historia treningów:**\n\nBrak wygenerowanych treningów.")
                .with_data(json!({ "count": 0 }));
        }
        let mut table =
            String::from("| Data | Trudność | Tryb | Uczestnicy | Ćwiczenia |\n|---|---|---|---|---|\n");
        for r in &records {
            table.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                r.created_at.format("%Y-%m-%d %H:%M"),
                r.difficulty.as_str(),
                r.mode.as_str(),
                r.participant_count,
                r.plan.exercise_count(),
            ));
        }
        CommandResult::ok(format!("**Historia treningów ({}):**\n\n{table}", records.len()))
            .with_data(json!({ "count": records.len() }))
    }
}

fn profile(client: &ClientRecord) -> String {
    format!(
        "**Profil: {}**\n\n\
         | Pole | Wartość |\n|------|---------|\n\
         | Wiek | {} |\n| Waga | {} |\n| Wzrost | {} |\n| Cel | {} |\n| Dodany | {} |",
        client.name,
        or_dash(client.age),
        with_unit(client.weight, "kg"),
        with_unit(client.height, "cm"),
        client.goals.as_deref().unwrap_or("-"),
        client.created_at.format("%Y-%m-%d"),
    )
}

fn or_dash<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn with_unit<T: Display>(value: Option<T>, unit: &str) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v} {unit}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::session::InMemorySessionStore;
    use crate::storage::JsonFileStore;
    use crate::types::Difficulty;

    fn executor(dir: &std::path::Path) -> CommandExecutor {
        CommandExecutor::new(
            Storage::default().with_tier(Arc::new(JsonFileStore::new(dir))),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(TrenerCfg::default()),
        )
    }

    fn parsed(payload: CommandPayload) -> ParsedCommand {
        ParsedCommand { payload, raw_match: String::new() }
    }

    fn create(name: &str) -> ParsedCommand {
        parsed(CommandPayload::CreateUser(PersonAttrs {
            name: Some(name.into()),
            age: Some(30),
            weight: Some(80.0),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn create_is_staged_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let result = exec.execute(&create("Jan Kowalski"), "s1").await;

        assert!(result.success);
        assert!(result.needs_confirmation);
        assert_eq!(result.command, Some(Command::CreateUser));
        assert!(result.message.contains("| Imię | Jan Kowalski |"));
        assert!(result.message.contains("| Waga | 80 kg |"));
        assert!(result.message.ends_with(CONFIRM_HINT));
        assert!(exec.storage().list_clients().await.unwrap().is_empty());
        assert!(exec.sessions().get("s1").is_some());
    }

    #[tokio::test]
    async fn confirm_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        exec.execute(&create("Jan"), "s1").await;

        let done = exec.execute_pending("s1").await;
        assert!(done.success, "{}", done.message);
        assert!(done.message.contains("**Jan**"));
        assert_eq!(done.data.as_ref().unwrap()["name"], "Jan");
        assert_eq!(exec.storage().list_clients().await.unwrap().len(), 1);

        let again = exec.execute_pending("s1").await;
        assert!(!again.success);
        assert_eq!(again.message, NOTHING_TO_CONFIRM);
    }

    #[tokio::test]
    async fn nameless_create_uses_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        exec.execute(&parsed(CommandPayload::CreateUser(PersonAttrs::default())), "s1").await;
        exec.execute_pending("s1").await;
        let clients = exec.storage().list_clients().await.unwrap();
        assert_eq!(clients[0].name, UNKNOWN_NAME);
    }

    #[tokio::test]
    async fn expired_action_is_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path()).with_pending_ttl(TimeDelta::seconds(-1));
        exec.execute(&create("Jan"), "s1").await;
        assert!(!exec.execute_pending("s1").await.success);
        assert!(exec.storage().list_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_flow_and_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        exec.execute(&create("Jan Kowalski"), "s1").await;
        exec.execute_pending("s1").await;

        let staged = exec.execute(&parsed(CommandPayload::DeleteUser { name: "kowalski".into() }), "s1").await;
        assert!(staged.needs_confirmation);
        assert!(staged.message.contains("nieodwracalna"));
        let done = exec.execute_pending("s1").await;
        assert!(done.success);
        assert!(done.message.contains("Jan Kowalski"));

        exec.execute(&parsed(CommandPayload::DeleteUser { name: "Nikt".into() }), "s1").await;
        let missing = exec.execute_pending("s1").await;
        assert!(!missing.success);
        assert_eq!(missing.message, "Nie znaleziono: Nikt");
    }

    #[tokio::test]
    async fn read_only_commands_never_stage() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        for payload in [CommandPayload::ListUsers, CommandPayload::ListTrainings, CommandPayload::Help] {
            let result = exec.execute(&parsed(payload), "s1").await;
            assert!(result.success);
            assert!(!result.needs_confirmation);
        }
        assert!(exec.sessions().is_empty());
    }

    #[tokio::test]
    async fn show_user_profile_and_miss() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        exec.execute(&create("Ola Nowak"), "s1").await;
        exec.execute_pending("s1").await;

        let shown = exec.execute(&parsed(CommandPayload::ShowUser { name: "ola".into() }), "s1").await;
        assert!(shown.success);
        assert!(shown.message.starts_with("**Profil: Ola Nowak**"));
        assert!(shown.message.contains("| Wiek | 30 |"));

        let miss = exec.execute(&parsed(CommandPayload::ShowUser { name: "Piotr".into() }), "s1").await;
        assert!(!miss.success);
    }

    #[tokio::test]
    async fn training_is_delegated_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let exec = executor(dir.path());
        let params = TrainingParams { participant_count: Some(5), ..Default::default() };
        let result = exec.execute(&parsed(CommandPayload::CreateTraining(params)), "s1").await;

        assert!(result.success);
        assert!(!result.needs_confirmation);
        let request = result.plan_request.unwrap();
        assert_eq!(request.participant_count, 5);
        assert_eq!(request.difficulty, Difficulty::Medium);
        let data = result.data.unwrap();
        assert_eq!(data["delegate"], "plan_generation");
        assert_eq!(data["params"]["mode"], "circuit");
        assert!(exec.sessions().is_empty());
    }

    #[tokio::test]
    async fn storage_down_reports_failure() {
        let exec = CommandExecutor::new(
            Storage::default(),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(TrenerCfg::default()),
        );
        let result = exec.execute(&parsed(CommandPayload::ListUsers), "s1").await;
        assert!(!result.success);
        assert!(result.message.contains("no storage backend configured"));
    }
}

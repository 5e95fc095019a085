use std::sync::Arc;

use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use trener_core::chat::ChatService;
use trener_core::types::{ChatRequest, HistoryTurn};

const SESSION_ID: &str = "repl";

enum InputEvent {
    Line(String),
    Interrupted,
    Eof,
    Error(String),
}

/// Interactive chat on stdin/stdout against the same pipeline as the server.
pub async fn run(chat: Arc<ChatService>, token: CancellationToken, notice: Option<String>) -> anyhow::Result<()> {
    if let Some(notice) = notice {
        println!("{notice}");
    }
    println!("Trener: wpisz `pomoc` po listę komend, `/q` aby wyjść.");

    let (line_tx, mut line_rx) = mpsc::unbounded_channel::<InputEvent>();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    spawn_input_thread(line_tx, ready_rx);
    let _ = ready_tx.send(());

    let mut history: Vec<HistoryTurn> = Vec::new();
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = line_rx.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        let line = match event {
            InputEvent::Line(line) => line,
            InputEvent::Interrupted => {
                token.cancel();
                break;
            }
            InputEvent::Eof => break,
            InputEvent::Error(err) => {
                eprintln!("input error: {err}");
                break;
            }
        };

        let text = line.trim();
        if matches!(text, "/q" | "/exit" | "/quit") {
            break;
        }
        if !text.is_empty() {
            let request = ChatRequest {
                message: text.to_string(),
                history: history.clone(),
                session_id: Some(SESSION_ID.to_string()),
            };
            let response = chat.handle(&request).await;
            println!("\n{}\n", response.response);
            if response.needs_confirmation {
                println!("(oczekuje na potwierdzenie: tak / anuluj)\n");
            }
            history.push(HistoryTurn { role: "user".into(), content: request.message });
            history.push(HistoryTurn { role: "assistant".into(), content: response.response });
        }
        let _ = ready_tx.send(());
    }
    Ok(())
}

fn spawn_input_thread(line_tx: mpsc::UnboundedSender<InputEvent>, ready_rx: std::sync::mpsc::Receiver<()>) {
    std::thread::spawn(move || {
        let mut editor = match rustyline::DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                let _ = line_tx.send(InputEvent::Error(e.to_string()));
                return;
            }
        };

        while ready_rx.recv().is_ok() {
            let event = match editor.readline("Ty> ") {
                Ok(line) => {
                    let _ = editor.add_history_entry(line.as_str());
                    InputEvent::Line(line)
                }
                Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                Err(ReadlineError::Eof) => InputEvent::Eof,
                Err(e) => InputEvent::Error(e.to_string()),
            };
            let last = !matches!(event, InputEvent::Line(_));
            if line_tx.send(event).is_err() || last {
                break;
            }
        }
    });
}

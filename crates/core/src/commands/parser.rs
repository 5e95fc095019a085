//! Deterministic command recognition.
//!
//! An ordered table of regex recognizers; the first recognizer that matches
//! and whose payload extractor succeeds wins. Patterns overlap on purpose
//! (e.g. `pokaż` starts both the profile and the history commands), so the
//! table order is part of the behavior and must not be rearranged.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::types::{
    Command, CommandPayload, Difficulty, ParsedCommand, PersonAttrs, TrainingMode, TrainingParams,
};

/// Why a recognizer matched but could not produce a payload.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("capture group {0} did not participate in the match")]
    MissingGroup(usize),
    #[error("number out of range: {0}")]
    NumberOutOfRange(String),
    #[error("'{0}' names a command noun, not a person")]
    ReservedName(String),
}

type Extractor = fn(&AttributeParser, &Captures<'_>, &str) -> Result<CommandPayload, ExtractError>;

struct Rule {
    command: Command,
    pattern: Regex,
    extract: Extractor,
}

/// Recognizer table, in priority order.
const RULES: &[(Command, &str, Extractor)] = &[
    (Command::Help, r"^(?:pomoc|help|komendy|commands|\?)$", help),
    (
        Command::CreateUser,
        r"\b(?:dodaj|utwórz|stwórz|nowy|nowa|add|create)\s+(?:podopieczn\w*|klient\w*|użytkownik\w*|user\w*|client\w*)\b[\s:]*(.+)",
        create_user,
    ),
    (
        Command::CreateUser,
        r"\b(?:dodaj|utwórz|nowy|nowa|add)\s+((?-i:\p{Lu}\p{Ll}+)(?:\s+(?-i:\p{Lu}\p{Ll}+))?(?:[\s,].+)?)",
        create_user_short,
    ),
    (
        Command::ListUsers,
        r"\b(?:lista|pokaż|wyświetl|list|show)\s+(?:podopieczn\w*|klient\w*|użytkownik\w*|users?\b|clients?\b|(?:wszystk\w*|all\b)(?:\s+(\p{L}+))?)",
        list_everyone,
    ),
    (
        Command::ListUsers,
        r"\b(?:podopieczni|klienci|użytkownicy|clients|users)$",
        list_users,
    ),
    (
        Command::ShowUser,
        r"\b(?:pokaż\s+dane|pokaż|dane|info|szczegóły|profil|details|show)\s*[:\-]?\s+(?:(?:podopieczn\w*|klient\w*|client\w*)\s*)?[:\-]?\s*\b(\p{L}+)",
        show_user,
    ),
    (
        Command::DeleteUser,
        r"\b(?:usuń|usun|skasuj|delete|remove)\s*[:\-]?\s+(?:(?:podopieczn\w*|klient\w*|użytkownik\w*|user\w*|client\w*)\s*)?[:\-]?\s*\b(\p{L}+)",
        delete_user,
    ),
    (
        Command::CreateTraining,
        r"\b(?:wygeneruj|generuj|stwórz|zrób|utwórz|przygotuj|create|generate|make)\s+(?:(?:a|an|nowy|new)\s+)?(?:plan\s+)?(?:trening\w*|training|workout|circuit|obwód)",
        create_training,
    ),
    (
        Command::CreateTraining,
        r"\b(?:trening|training|circuit|obwód)\s+(?:dla|na|for)\s+(\d+)",
        training_for_count,
    ),
    (
        Command::ListTrainings,
        r"\b(?:lista|pokaż|historia|list|show|history)\s+(?:of\s+)?(?:(?:all|wszystk\w*)\s+)?(?:trening\w*|plan\w*|training\w*|workout\w*)",
        list_trainings,
    ),
];

fn help(_: &AttributeParser, _: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    Ok(CommandPayload::Help)
}

fn create_user(attrs: &AttributeParser, caps: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    Ok(CommandPayload::CreateUser(attrs.person(group(caps, 1)?)))
}

fn create_user_short(attrs: &AttributeParser, caps: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    let person = attrs.person(group(caps, 1)?);
    if let Some(name) = &person.name {
        ensure_person_name(name)?;
    }
    Ok(CommandPayload::CreateUser(person))
}

fn list_users(_: &AttributeParser, _: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    Ok(CommandPayload::ListUsers)
}

/// "pokaż wszystkie treningi" belongs to the history rule.
fn list_everyone(_: &AttributeParser, caps: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    match caps.get(1).map(|m| m.as_str()) {
        Some(noun) if is_training_noun(noun) => Err(ExtractError::ReservedName(noun.to_string())),
        _ => Ok(CommandPayload::ListUsers),
    }
}

fn show_user(_: &AttributeParser, caps: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    let name = ensure_person_name(group(caps, 1)?)?;
    Ok(CommandPayload::ShowUser { name })
}

fn delete_user(_: &AttributeParser, caps: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    let name = ensure_person_name(group(caps, 1)?)?;
    Ok(CommandPayload::DeleteUser { name })
}

fn create_training(attrs: &AttributeParser, _: &Captures<'_>, message: &str) -> Result<CommandPayload, ExtractError> {
    Ok(CommandPayload::CreateTraining(attrs.training(message)))
}

fn training_for_count(_: &AttributeParser, caps: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    let count = parse_number(group(caps, 1)?)?;
    Ok(CommandPayload::CreateTraining(TrainingParams {
        participant_count: Some(count),
        ..Default::default()
    }))
}

fn list_trainings(_: &AttributeParser, _: &Captures<'_>, _: &str) -> Result<CommandPayload, ExtractError> {
    Ok(CommandPayload::ListTrainings)
}

/// Nouns that start command phrases. A "name" equal to one of these means a
/// broader recognizer grabbed a phrase meant for a later one.
const RESERVED_STEMS: &[&str] = &[
    "trening", "plan", "obwód", "obwod", "podopieczn", "klient", "użytkownik", "wszystk",
];
const RESERVED_WORDS: &[&str] = &[
    "training", "trainings", "workout", "workouts", "circuit", "user", "users", "client",
    "clients", "all",
];
/// Pronouns and question words: "show me how..." is a question, not a lookup.
const FUNCTION_WORDS: &[&str] = &[
    "me", "my", "mi", "mnie", "mój", "moje", "moich", "how", "what", "jak", "co", "czy", "jaki",
    "jakie", "the", "a", "an",
];
const TRAINING_STEMS: &[&str] = &["trening", "plan", "obwód", "obwod"];
const TRAINING_WORDS: &[&str] = &["training", "trainings", "workout", "workouts", "circuit", "circuits"];

fn is_training_noun(word: &str) -> bool {
    let lower = word.to_lowercase();
    TRAINING_STEMS.iter().any(|stem| lower.starts_with(stem)) || TRAINING_WORDS.contains(&lower.as_str())
}

fn ensure_person_name(name: &str) -> Result<String, ExtractError> {
    let lower = name.to_lowercase();
    let reserved = RESERVED_STEMS.iter().any(|stem| lower.starts_with(stem))
        || RESERVED_WORDS.contains(&lower.as_str())
        || FUNCTION_WORDS.contains(&lower.as_str());
    if reserved {
        Err(ExtractError::ReservedName(name.to_string()))
    } else {
        Ok(name.to_string())
    }
}

fn group<'t>(caps: &Captures<'t>, index: usize) -> Result<&'t str, ExtractError> {
    caps.get(index)
        .map(|m| m.as_str())
        .ok_or(ExtractError::MissingGroup(index))
}

fn parse_number(digits: &str) -> Result<u32, ExtractError> {
    digits
        .parse()
        .map_err(|_| ExtractError::NumberOutOfRange(digits.to_string()))
}

/// Free-text attribute sub-parsers shared by the recognizers.
pub struct AttributeParser {
    name: Regex,
    age: Regex,
    weight: Regex,
    height: Regex,
    goals: Regex,
    difficulty_label: Regex,
    easy: Regex,
    hard: Regex,
    medium: Regex,
    circuit: Regex,
    common: Regex,
    participants: Regex,
    duration: Regex,
    target: Regex,
}

impl AttributeParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            name: Regex::new(r"^([\p{L}\s]+?)(?:,|\d|$)")?,
            age: Regex::new(r"(?i)(\d+)\s*(?:lat|lata|roku|rok|years?|y\.?o\.?|l\.)(?:\W|$)")?,
            weight: Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(?:kg|kilo)")?,
            height: Regex::new(r"(?i)(\d+)\s*(?:cm|centymetr)")?,
            goals: Regex::new(r"(?i)\b(?:cel|goal)[:\s]+(.+?)(?:,|$)")?,
            difficulty_label: Regex::new(r"(?i)\btrudno(?:ść|sc)\b\s*:?")?,
            easy: Regex::new(r"(?i)\b(?:łatw|easy|pocz[aą]tkuj|beginner)\w*")?,
            hard: Regex::new(r"(?i)\b(?:trudn|hard|zaawans|advanced)\w*")?,
            medium: Regex::new(r"(?i)\b(?:średni|sredni|medium|intermediate)\w*")?,
            circuit: Regex::new(r"(?i)\b(?:circuit|obwod|obwód)\w*")?,
            common: Regex::new(r"(?i)\b(?:common|wspóln|wspoln)\w*")?,
            participants: Regex::new(r"(?i)(\d+)\s*(?:os[oó]b|person|people|uczestnik|participant)")?,
            duration: Regex::new(r"(?i)(\d+)\s*min")?,
            target: Regex::new(r"(?i)\b(?:dla|for)\s+(\p{L}+)")?,
        })
    }

    /// Extract person attributes from text like "Jan Kowalski, 30 lat, 80kg".
    /// Each field is independent; a field whose pattern misses is left out.
    pub fn person(&self, text: &str) -> PersonAttrs {
        let text = text.trim();
        let first = |re: &Regex| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
        };

        PersonAttrs {
            name: first(&self.name).filter(|n| !n.is_empty()),
            age: first(&self.age).and_then(|v| v.parse().ok()),
            weight: first(&self.weight).and_then(|v| v.replace(',', ".").parse().ok()),
            height: first(&self.height).and_then(|v| v.parse().ok()),
            goals: first(&self.goals).filter(|g| !g.is_empty()),
        }
    }

    /// Extract training parameters from a whole message.
    pub fn training(&self, text: &str) -> TrainingParams {
        // "trudność: easy" must not count as a hard-bucket synonym.
        let graded = self.difficulty_label.replace_all(text, " ");
        let difficulty = if self.easy.is_match(&graded) {
            Some(Difficulty::Easy)
        } else if self.hard.is_match(&graded) {
            Some(Difficulty::Hard)
        } else if self.medium.is_match(&graded) {
            Some(Difficulty::Medium)
        } else {
            None
        };

        let mode = if self.circuit.is_match(text) {
            Some(TrainingMode::Circuit)
        } else if self.common.is_match(text) {
            Some(TrainingMode::Common)
        } else {
            None
        };

        let number = |re: &Regex| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok())
        };

        TrainingParams {
            difficulty,
            mode,
            participant_count: number(&self.participants),
            duration_minutes: number(&self.duration),
            target_person_name: self
                .target
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
        }
    }
}

/// Ordered recognizer table plus the attribute sub-parsers.
pub struct CommandParser {
    rules: Vec<Rule>,
    attrs: AttributeParser,
}

impl CommandParser {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .map(|&(command, pattern, extract)| {
                Ok(Rule {
                    command,
                    pattern: Regex::new(&format!("(?i){pattern}"))?,
                    extract,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules, attrs: AttributeParser::new()? })
    }

    pub fn attributes(&self) -> &AttributeParser {
        &self.attrs
    }

    /// Classify a message. Never fails: a rule whose extractor errors is
    /// skipped, and a message no rule accepts yields `Command::None`.
    pub fn parse(&self, message: &str) -> ParsedCommand {
        let msg = message.trim();
        if msg.is_empty() {
            return ParsedCommand::none();
        }

        for (index, rule) in self.rules.iter().enumerate() {
            let Some(caps) = rule.pattern.captures(msg) else {
                continue;
            };
            match (rule.extract)(&self.attrs, &caps, msg) {
                Ok(payload) => {
                    debug_assert_eq!(payload.command(), rule.command);
                    let raw_match = caps.get(0).map_or("", |m| m.as_str()).to_string();
                    tracing::debug!(command = %rule.command, rule = index, raw_match = %raw_match, "command recognized");
                    return ParsedCommand { payload, raw_match };
                }
                Err(e @ ExtractError::ReservedName(_)) => {
                    tracing::debug!(command = %rule.command, rule = index, reason = %e, "recognizer skipped");
                }
                Err(e) => {
                    tracing::warn!(command = %rule.command, rule = index, error = %e, "payload extraction failed, trying next recognizer");
                }
            }
        }

        ParsedCommand::none()
    }
}

/// The process-wide parser. `None` only if a built-in pattern fails to compile.
pub fn default_parser() -> Option<&'static CommandParser> {
    static PARSER: OnceLock<Option<CommandParser>> = OnceLock::new();
    PARSER
        .get_or_init(|| match CommandParser::new() {
            Ok(parser) => Some(parser),
            Err(e) => {
                tracing::error!(error = %e, "command patterns failed to compile; every message goes to the fallback");
                None
            }
        })
        .as_ref()
}

/// Classify a message with the process-wide parser.
pub fn parse(message: &str) -> ParsedCommand {
    match default_parser() {
        Some(parser) => parser.parse(message),
        None => ParsedCommand::none(),
    }
}

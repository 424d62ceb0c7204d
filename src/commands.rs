use crate::models::{CheckInOutcome, Command};
use crate::policy::{validate_user_id, InputPolicy};
use crate::store::RecordStore;

pub const HELP_TEXT: &str = "Hi! Use:\n\
/challenge - to start your gym challenge\n\
/help - to show help message\n\
/set_weekly x - to set the amount of workouts per week\n\
/post - to upload your weekly photo\n\
/my_stat - to show your statistics\n\
/stop - to suspend your challenge\n\
/delete_data - to remove your user data\n\
/show_privacy - to show the privacy policy message";

pub const PRIVACY_TEXT: &str = "Privacy policy\n\
We store your chat user id, your weekly workout target, the times of this week's check-ins \
and your current and longest streak. Nothing else is kept, and photos are not stored.\n\
Use /stop and then /delete_data to remove everything we hold about you.";

const ONBOARDING_TEXT: &str = "Hello there! You have challenged the club to show who is the boss of the gym!\n\
Use /set_weekly <number> to register a number of days per week you'd commit.";
const RETRY_TEXT: &str = "Sorry, a big bad error stopped you from challenging! Try again.";
const NO_ACTIVE_TO_STOP_TEXT: &str = "You do not have active challenges to stop!";
const STOPPED_TEXT: &str = "You have stopped your challenge!\nVery disappointing! Use /set_weekly to restart.";
const NO_ACTIVE_TEXT: &str = "You currently do not have active challenges!\n\
To start a challenge, use /set_weekly <number> to register a number of days per week you'd commit.";
const ALREADY_CHECKED_IN_TEXT: &str = "You already checked in this week. Come back next week to keep the streak going!";
const TRUST_NOTE_TEXT: &str = "Your evidence was accepted on trust; photos are not verified.";
const DELETED_TEXT: &str = "Your user data was deleted.";
const DELETE_FAILED_TEXT: &str = "Couldn't delete your data. Try again.";
const STOP_BEFORE_DELETE_TEXT: &str = "Before deleting your data you need to stop your challenge.\n\
Use /stop and try again afterwards.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand<'a> {
    Known { command: Command, args: &'a str },
    Unknown { name: &'a str },
}

/// Splits `/name@bot rest` into the command and its raw argument text.
/// Plain chat text is not a command and yields `None`.
pub fn parse_command_text(text: &str) -> Option<ParsedCommand<'_>> {
    let trimmed = text.trim_start();
    let body = trimmed.strip_prefix('/')?;
    let (head, args) = match body.find(char::is_whitespace) {
        Some(index) => (&body[..index], body[index..].trim()),
        None => (body, ""),
    };
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return None;
    }

    Some(match Command::parse(name) {
        Some(command) => ParsedCommand::Known { command, args },
        None => ParsedCommand::Unknown { name },
    })
}

/// Maps one command from one user to one reply.
#[derive(Clone)]
pub struct CommandHandler {
    store: RecordStore,
    input_policy: InputPolicy,
}

impl CommandHandler {
    pub fn new(store: RecordStore, input_policy: InputPolicy) -> Self {
        Self { store, input_policy }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Parses raw chat text and handles it. `None` means the text was not a
    /// command and nothing should be sent back.
    pub fn handle_text(&self, user_id: &str, text: &str) -> Option<String> {
        match parse_command_text(text)? {
            ParsedCommand::Known { command, args } => Some(self.handle(command, user_id, args)),
            ParsedCommand::Unknown { name } => Some(format!(
                "I don't know the command /{}. Use /help to see what I can do.",
                name
            )),
        }
    }

    pub fn handle(&self, command: Command, user_id: &str, args: &str) -> String {
        if let Err(error) = validate_user_id(user_id) {
            tracing::warn!(command = command.as_str(), error = %error, "rejected command with invalid user id");
            return RETRY_TEXT.to_string();
        }

        match command {
            Command::Challenge => self.start_challenge(user_id),
            Command::Help => HELP_TEXT.to_string(),
            Command::ShowPrivacy => PRIVACY_TEXT.to_string(),
            Command::Stop => self.stop(user_id),
            Command::SetWeekly => self.set_weekly(user_id, args),
            Command::Post => self.post(user_id),
            Command::MyStat => self.store.get_user_stats(user_id),
            Command::DeleteData => self.delete_data(user_id),
        }
    }

    fn start_challenge(&self, user_id: &str) -> String {
        if self.store.get_user(user_id).is_some() || self.store.create_user(user_id) {
            ONBOARDING_TEXT.to_string()
        } else {
            RETRY_TEXT.to_string()
        }
    }

    fn stop(&self, user_id: &str) -> String {
        if !self.store.is_active(user_id) {
            return NO_ACTIVE_TO_STOP_TEXT.to_string();
        }
        self.store.stop_user(user_id);
        STOPPED_TEXT.to_string()
    }

    fn set_weekly(&self, user_id: &str, args: &str) -> String {
        let days = match self.input_policy.validate_weekly_days(args) {
            Ok(days) => days,
            Err(error) => {
                tracing::debug!(user_id = %user_id, error = %error, "invalid weekly target");
                return format!(
                    "Use /set_weekly <number> with a number of days between {} and {}.",
                    self.input_policy.min_weekly_days(),
                    self.input_policy.max_weekly_days()
                );
            }
        };

        if !self.store.ensure_user(user_id) || !self.store.update_user_days(user_id, days) {
            return RETRY_TEXT.to_string();
        }

        format!(
            "You have committed to {} {} per week.\nUse /post <your gym photo> to submit your evidence.",
            days,
            if days == 1 { "workout" } else { "workouts" }
        )
    }

    fn post(&self, user_id: &str) -> String {
        if !self.store.is_active(user_id) {
            return NO_ACTIVE_TEXT.to_string();
        }

        // No photo check or achievements; the check-in is taken on trust.
        match self.store.record_hit(user_id) {
            CheckInOutcome::Recorded {
                streak, new_best, ..
            } => {
                let mut reply = format!(
                    "Check-in recorded! Your streak is {} {}.",
                    streak,
                    if streak == 1 { "week" } else { "weeks" }
                );
                if new_best && streak > 1 {
                    reply.push_str("\nThat's a new personal best!");
                }
                reply.push('\n');
                reply.push_str(TRUST_NOTE_TEXT);
                reply
            }
            CheckInOutcome::Accumulated { hits_this_week } => format!(
                "Check-in recorded! That's workout number {} this week.\n{}",
                hits_this_week, TRUST_NOTE_TEXT
            ),
            CheckInOutcome::AlreadyCheckedIn => ALREADY_CHECKED_IN_TEXT.to_string(),
            CheckInOutcome::NotActive | CheckInOutcome::NotFound => NO_ACTIVE_TEXT.to_string(),
            CheckInOutcome::Failed => RETRY_TEXT.to_string(),
        }
    }

    fn delete_data(&self, user_id: &str) -> String {
        if self.store.is_active(user_id) {
            return STOP_BEFORE_DELETE_TEXT.to_string();
        }
        if self.store.delete_user(user_id) {
            DELETED_TEXT.to_string()
        } else {
            DELETE_FAILED_TEXT.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_command_text, CommandHandler, ParsedCommand, HELP_TEXT};
    use crate::db::Database;
    use crate::models::{Command, DuplicateHitPolicy};
    use crate::policy::InputPolicy;
    use crate::redaction::Redactor;
    use crate::store::{RecordStore, NO_STATS_MESSAGE};
    use std::sync::Arc;

    fn handler() -> (tempfile::TempDir, CommandHandler) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("gymbros.db")).expect("db");
        let store = RecordStore::new(Arc::new(db), DuplicateHitPolicy::Reject, Arc::new(Redactor::default()));
        (dir, CommandHandler::new(store, InputPolicy::default()))
    }

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(
            parse_command_text("/set_weekly@GymBrosBot  4 "),
            Some(ParsedCommand::Known {
                command: Command::SetWeekly,
                args: "4"
            })
        );
        assert_eq!(
            parse_command_text("/post"),
            Some(ParsedCommand::Known {
                command: Command::Post,
                args: ""
            })
        );
        assert_eq!(parse_command_text("/dance"), Some(ParsedCommand::Unknown { name: "dance" }));
        assert_eq!(parse_command_text("hello there"), None);
        assert_eq!(parse_command_text("/"), None);
    }

    #[test]
    fn help_lists_every_command() {
        for command in Command::ALL {
            assert!(HELP_TEXT.contains(&format!("/{}", command.as_str())));
        }
    }

    #[test]
    fn set_weekly_uses_the_supplied_day_count() {
        let (_dir, handler) = handler();
        let reply = handler.handle(Command::SetWeekly, "42", "3");
        assert!(reply.contains("3 workouts per week"));

        let record = handler.store().get_user("42").expect("created on demand");
        assert_eq!(record.days, 3);
        assert!(record.active);
    }

    #[test]
    fn set_weekly_rejects_bad_arguments_without_touching_the_store() {
        let (_dir, handler) = handler();
        for args in ["", "0", "8", "lots"] {
            let reply = handler.handle(Command::SetWeekly, "42", args);
            assert!(reply.contains("between 1 and 7"), "reply for {:?}: {}", args, reply);
        }
        assert!(handler.store().get_user("42").is_none());
    }

    #[test]
    fn post_requires_an_active_challenge() {
        let (_dir, handler) = handler();
        handler.handle(Command::Challenge, "42", "");
        let reply = handler.handle(Command::Post, "42", "");
        assert!(reply.starts_with("You currently do not have active challenges!"));
    }

    #[test]
    fn second_post_in_a_week_is_rejected() {
        let (_dir, handler) = handler();
        handler.handle(Command::SetWeekly, "42", "2");
        assert!(handler.handle(Command::Post, "42", "").contains("streak is 1 week"));
        assert!(handler.handle(Command::Post, "42", "").contains("already checked in"));
    }

    #[test]
    fn post_reply_says_the_evidence_is_taken_on_trust() {
        let (_dir, handler) = handler();
        handler.handle(Command::SetWeekly, "42", "2");
        let reply = handler.handle(Command::Post, "42", "");
        assert!(reply.starts_with("Check-in recorded!"));
        assert!(reply.contains("accepted on trust"));
    }

    #[test]
    fn challenge_is_repeatable() {
        let (_dir, handler) = handler();
        let first = handler.handle(Command::Challenge, "42", "");
        let second = handler.handle(Command::Challenge, "42", "");
        assert!(first.starts_with("Hello there!"));
        assert_eq!(first, second);
    }

    #[test]
    fn stop_without_challenge_says_so() {
        let (_dir, handler) = handler();
        assert_eq!(
            handler.handle(Command::Stop, "42", ""),
            "You do not have active challenges to stop!"
        );
    }

    #[test]
    fn my_stat_for_unknown_user_is_not_an_error() {
        let (_dir, handler) = handler();
        assert_eq!(handler.handle(Command::MyStat, "404", ""), NO_STATS_MESSAGE);
    }

    #[test]
    fn unknown_command_points_to_help() {
        let (_dir, handler) = handler();
        let reply = handler.handle_text("42", "/dance").expect("reply");
        assert!(reply.contains("/help"));
        assert!(handler.handle_text("42", "just chatting").is_none());
    }

    #[test]
    fn invalid_user_id_is_refused() {
        let (_dir, handler) = handler();
        let reply = handler.handle(Command::Challenge, "", "");
        assert!(reply.starts_with("Sorry"));
    }
}

use crate::errors::{AppError, AppResult};

pub const MIN_WEEKLY_DAYS: u8 = 1;
pub const MAX_WEEKLY_DAYS: u8 = 7;
const MAX_USER_ID_LENGTH: usize = 64;

/// Bounds applied to command arguments before anything reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputPolicy {
    min_weekly_days: u8,
    max_weekly_days: u8,
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self::new(MIN_WEEKLY_DAYS, MAX_WEEKLY_DAYS)
    }
}

impl InputPolicy {
    pub fn new(min_weekly_days: u8, max_weekly_days: u8) -> Self {
        let min_weekly_days = min_weekly_days.clamp(MIN_WEEKLY_DAYS, MAX_WEEKLY_DAYS);
        let max_weekly_days = max_weekly_days.clamp(min_weekly_days, MAX_WEEKLY_DAYS);
        Self {
            min_weekly_days,
            max_weekly_days,
        }
    }

    pub fn min_weekly_days(&self) -> u8 {
        self.min_weekly_days
    }

    pub fn max_weekly_days(&self) -> u8 {
        self.max_weekly_days
    }

    pub fn validate_weekly_days(&self, raw: &str) -> AppResult<u8> {
        let Some(token) = raw.split_whitespace().next() else {
            return Err(AppError::Validation("Weekly day count is required".to_string()));
        };

        let days = token
            .parse::<u8>()
            .map_err(|_| AppError::Validation(format!("'{}' is not a whole number of days", token)))?;

        if days < self.min_weekly_days || days > self.max_weekly_days {
            return Err(AppError::Validation(format!(
                "Weekly day count must be between {} and {}",
                self.min_weekly_days, self.max_weekly_days
            )));
        }

        Ok(days)
    }
}

pub fn validate_user_id(raw: &str) -> AppResult<&str> {
    if raw.is_empty() {
        return Err(AppError::Validation("User id cannot be empty".to_string()));
    }
    if raw.len() > MAX_USER_ID_LENGTH {
        return Err(AppError::Validation(format!(
            "User id exceeds {} characters",
            MAX_USER_ID_LENGTH
        )));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(AppError::Validation("User id cannot contain whitespace".to_string()));
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::{validate_user_id, InputPolicy};

    #[test]
    fn accepts_days_within_range() {
        let policy = InputPolicy::default();
        assert_eq!(policy.validate_weekly_days("3").expect("days"), 3);
        assert_eq!(policy.validate_weekly_days(" 7 ").expect("days"), 7);
        assert_eq!(policy.validate_weekly_days("1 please").expect("days"), 1);
    }

    #[test]
    fn rejects_missing_zero_and_out_of_range_days() {
        let policy = InputPolicy::default();
        assert!(policy.validate_weekly_days("").is_err());
        assert!(policy.validate_weekly_days("0").is_err());
        assert!(policy.validate_weekly_days("8").is_err());
        assert!(policy.validate_weekly_days("-2").is_err());
        assert!(policy.validate_weekly_days("three").is_err());
        assert!(policy.validate_weekly_days("999").is_err());
    }

    #[test]
    fn custom_bounds_are_clamped_to_a_week() {
        let policy = InputPolicy::new(2, 12);
        assert_eq!(policy.min_weekly_days(), 2);
        assert_eq!(policy.max_weekly_days(), 7);
        assert!(policy.validate_weekly_days("1").is_err());
    }

    #[test]
    fn user_ids_are_opaque_but_bounded() {
        assert_eq!(validate_user_id("123456789").expect("id"), "123456789");
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("12 34").is_err());
        assert!(validate_user_id(&"9".repeat(65)).is_err());
    }
}

use std::collections::HashMap;
use std::sync::Mutex;

/// How much detail a reply carries. Verbose replies carry a token usage footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
pub enum DisplayMode {
    #[name = "verbose"]
    Verbose,
    #[name = "concise"]
    Concise,
}

impl DisplayMode {
    pub fn label(self) -> &'static str {
        match self {
            DisplayMode::Verbose => "verbose",
            DisplayMode::Concise => "concise",
        }
    }
}

/// Per-user reply preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub mode: DisplayMode,
    /// Only the invoking user sees the reply.
    pub ephemeral: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            mode: DisplayMode::Verbose,
            ephemeral: true,
        }
    }
}

#[derive(Default)]
pub struct DisplayStore {
    settings: Mutex<HashMap<u64, DisplaySettings>>,
}

impl DisplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: u64) -> DisplaySettings {
        let settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        settings.get(&user_id).copied().unwrap_or_default()
    }

    /// `None` leaves that field as it was. Returns the resulting settings.
    pub fn update(
        &self,
        user_id: u64,
        mode: Option<DisplayMode>,
        ephemeral: Option<bool>,
    ) -> DisplaySettings {
        let mut settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
        let entry = settings.entry(user_id).or_default();
        if let Some(mode) = mode {
            entry.mode = mode;
        }
        if let Some(ephemeral) = ephemeral {
            entry.ephemeral = ephemeral;
        }
        *entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_unknown_user() {
        let store = DisplayStore::new();
        let settings = store.get(42);
        assert_eq!(settings.mode, DisplayMode::Verbose);
        assert!(settings.ephemeral);
    }

    #[test]
    fn test_partial_update() {
        let store = DisplayStore::new();
        let updated = store.update(42, Some(DisplayMode::Concise), None);
        assert_eq!(updated.mode, DisplayMode::Concise);
        assert!(updated.ephemeral);

        let updated = store.update(42, None, Some(false));
        assert_eq!(updated.mode, DisplayMode::Concise);
        assert!(!updated.ephemeral);

        // Other users are untouched.
        assert_eq!(store.get(7), DisplaySettings::default());
    }
}

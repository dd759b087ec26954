//! Runtime-mutable settings.
//!
//! The API key and the admin list start from [`Config`] but can be changed by the
//! master admin while the bot runs. Everything else in `Config` stays fixed.

use crate::config::Config;
use std::collections::BTreeSet;
use std::sync::RwLock;

pub struct Settings {
    api_key: RwLock<String>,
    master_admin_id: u64,
    admin_user_ids: RwLock<BTreeSet<u64>>,
}

impl Settings {
    pub fn new(api_key: impl Into<String>, master_admin_id: u64, admins: &[u64]) -> Self {
        Self {
            api_key: RwLock::new(api_key.into()),
            master_admin_id,
            admin_user_ids: RwLock::new(admins.iter().copied().collect()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.api_key.clone(),
            config.master_admin(),
            &config.admin_user_ids,
        )
    }

    pub fn api_key(&self) -> String {
        self.api_key
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn master_admin_id(&self) -> u64 {
        self.master_admin_id
    }

    pub fn is_master_admin(&self, user_id: u64) -> bool {
        user_id == self.master_admin_id
    }

    /// The master admin is always an admin.
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.is_master_admin(user_id)
            || self
                .admin_user_ids
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .contains(&user_id)
    }

    pub fn admins(&self) -> Vec<u64> {
        self.admin_user_ids
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .copied()
            .collect()
    }

    /// Callers check permissions first; this only swaps the value.
    pub fn set_api_key(&self, new_key: impl Into<String>) {
        *self.api_key.write().unwrap_or_else(|e| e.into_inner()) = new_key.into();
    }

    /// Returns whether the admin set changed.
    pub fn set_admin(&self, user_id: u64, add: bool) -> bool {
        let mut admins = self
            .admin_user_ids
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if add {
            admins.insert(user_id)
        } else {
            admins.remove(&user_id)
        }
    }
}

/// Shows the first few and last few characters of a secret, for logs.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 11 {
        return "***".to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}***{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_checks() {
        let settings = Settings::new("key", 1, &[2]);
        assert!(settings.is_master_admin(1));
        assert!(!settings.is_master_admin(2));
        assert!(settings.is_admin(1));
        assert!(settings.is_admin(2));
        assert!(!settings.is_admin(3));
    }

    #[test]
    fn test_set_admin() {
        let settings = Settings::new("key", 1, &[]);
        assert!(settings.set_admin(5, true));
        assert!(!settings.set_admin(5, true));
        assert_eq!(settings.admins(), vec![5]);
        assert!(settings.set_admin(5, false));
        assert!(settings.admins().is_empty());
    }

    #[test]
    fn test_set_api_key() {
        let settings = Settings::new("old", 1, &[]);
        settings.set_api_key("new");
        assert_eq!(settings.api_key(), "new");
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret("sk-abcdefghijklmnop"), "sk-abcd***mnop");
    }
}

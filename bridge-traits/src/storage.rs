//! Settings Storage Abstraction
//!
//! Key-value preferences storage used to persist the player configuration
//! (volume, default stream link) between runs.

use async_trait::async_trait;

use crate::error::Result;

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences/settings storage:
/// - Desktop: JSON config file under the platform config directory
/// - Mobile: UserDefaults / SharedPreferences
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn save_volume(store: &dyn SettingsStore, gain: f64) -> Result<()> {
///     store.set_f64("volume", gain).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a floating-point value
    async fn set_f64(&self, key: &str, value: f64) -> Result<()>;

    /// Retrieve a floating-point value
    async fn get_f64(&self, key: &str) -> Result<Option<f64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;
    use mockall::predicate::eq;

    mock! {
        Settings {}

        #[async_trait]
        impl SettingsStore for Settings {
            async fn set_string(&self, key: &str, value: &str) -> Result<()>;
            async fn get_string(&self, key: &str) -> Result<Option<String>>;
            async fn set_f64(&self, key: &str, value: f64) -> Result<()>;
            async fn get_f64(&self, key: &str) -> Result<Option<f64>>;
            async fn delete(&self, key: &str) -> Result<()>;
            async fn list_keys(&self) -> Result<Vec<String>>;
        }
    }

    #[tokio::test]
    async fn test_has_key_uses_get_string() {
        let mut store = MockSettings::new();
        store
            .expect_get_string()
            .with(eq("link"))
            .returning(|_| Ok(Some("http://radio.example/stream".to_string())));
        store
            .expect_get_string()
            .with(eq("databaseLink"))
            .returning(|_| Ok(None));

        assert!(store.has_key("link").await.unwrap());
        assert!(!store.has_key("databaseLink").await.unwrap());
    }
}

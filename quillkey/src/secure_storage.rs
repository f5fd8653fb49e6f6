use thiserror::Error;

const SERVICE_NAME: &str = "com.quillkey.app";
pub const LLM_API_KEY_ACCOUNT: &str = "llm_api_key";
pub const TRANSCRIBER_API_KEY_ACCOUNT: &str = "transcriber_api_key";

#[derive(Debug, Error)]
pub enum SecureStorageError {
    #[error("failed to open credential entry `{account}`: {message}")]
    Entry { account: String, message: String },
    #[error("failed to read `{account}` from secure storage: {message}")]
    Read { account: String, message: String },
}

fn entry(account: &str) -> Result<keyring::Entry, SecureStorageError> {
    keyring::Entry::new(SERVICE_NAME, account).map_err(|err| SecureStorageError::Entry {
        account: account.to_string(),
        message: err.to_string(),
    })
}

pub fn read_api_key(account: &str) -> Result<Option<String>, SecureStorageError> {
    match entry(account)?.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) if is_not_found_error(&err.to_string()) => Ok(None),
        Err(err) => Err(SecureStorageError::Read {
            account: account.to_string(),
            message: err.to_string(),
        }),
    }
}

fn is_not_found_error(message: &str) -> bool {
    let normalized = message.to_lowercase();
    normalized.contains("no entry")
        || normalized.contains("not found")
        || normalized.contains("no matching entry")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_not_found_messages_are_recognized() {
        assert!(is_not_found_error("No matching entry found in secure storage"));
        assert!(is_not_found_error("Element not found."));
        assert!(!is_not_found_error("access denied"));
    }

    #[test]
    fn storage_errors_name_the_account() {
        let err = SecureStorageError::Read {
            account: LLM_API_KEY_ACCOUNT.to_string(),
            message: "access denied".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to read `llm_api_key` from secure storage: access denied"
        );
    }
}

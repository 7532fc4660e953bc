// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::DistLockError;
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a DistLockError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a DistLockError) -> Self {
        let (suggestion, details) = match error {
            DistLockError::InvalidArgument(msg) => {
                let suggestion = Some(
                    "Both the resource id and the owner must be non-empty strings.".to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            DistLockError::LockNotHeld(resource) => {
                let suggestion = Some(
                    "Another owner may hold the resource, or the lock store may be unreachable.\n\
                     Run 'distlock status <resource>' to inspect the current lock row."
                        .to_string(),
                );
                let details = Some(format!("Lock request for '{resource}' was not granted."));
                (suggestion, details)
            }
            DistLockError::Storage(msg) => {
                let suggestion = Some(
                    "Check that the lock database is reachable and writable, or set \
                     DISTLOCK_LOCKING__DATABASE to another location."
                        .to_string(),
                );
                let details = Some(format!("Store operation failed: {msg}"));
                (suggestion, details)
            }
            DistLockError::Sql(err) => {
                let suggestion = Some(
                    "Check that the lock database is reachable and writable.".to_string(),
                );
                let details = Some(format!("SQLite reported: {err}"));
                (suggestion, details)
            }
            DistLockError::FeatureStart { feature, details } => {
                let suggestion = Some(format!(
                    "The '{feature}' feature could not start; verify the [locking] section of \
                     config.toml."
                ));
                (suggestion, Some(details.clone()))
            }
            DistLockError::ConfigError(msg) | DistLockError::InvalidConfig(msg) => {
                let suggestion = Some(
                    "Review $DISTLOCK_HOME/config.toml and any DISTLOCK_* environment variables."
                        .to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            DistLockError::LockingTimeout { resource, .. } => {
                let suggestion = Some(format!(
                    "Another owner still holds '{resource}'. Retry later, increase --wait, or \
                     use --wait infinite."
                ));
                (suggestion, None)
            }
            DistLockError::LockingCancelled { .. } => {
                let suggestion =
                    Some("The wait was interrupted; re-run the command to retry.".to_string());
                (suggestion, None)
            }
            _ => (None, None),
        };

        ErrorContext {
            error,
            suggestion,
            details,
        }
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

impl<'a> fmt::Display for ErrorContext<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

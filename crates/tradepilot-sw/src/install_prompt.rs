//! Deferred install offer held by the page.
//!
//! This lives in page context and never talks to the worker; both only share
//! the installable-app contract. A captured offer is consumed at most once
//! and dropped after the user answers or the page navigates away.

use std::time::Instant;

use tracing::debug;

use crate::ServiceWorkerError;

/// Platform family, for choosing install instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
    Desktop,
}

impl Platform {
    /// Detect the platform from a user-agent string.
    pub fn detect(user_agent: &str) -> Self {
        if ["iPhone", "iPad", "iPod"].iter().any(|d| user_agent.contains(d)) {
            Platform::Ios
        } else if user_agent.contains("Android") {
            Platform::Android
        } else {
            Platform::Desktop
        }
    }
}

/// A platform install offer the page deferred.
#[derive(Debug, Clone)]
pub struct DeferredPrompt {
    /// Platforms the offer targets (e.g. "web", "play").
    pub platforms: Vec<String>,
    pub captured_at: Instant,
}

impl DeferredPrompt {
    pub fn new(platforms: Vec<String>) -> Self {
        Self {
            platforms,
            captured_at: Instant::now(),
        }
    }
}

/// The user's answer to a shown prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChoice {
    Accepted,
    Dismissed,
}

/// Page-side holder of the install offer.
#[derive(Debug)]
pub struct InstallPromptCapture {
    deferred: Option<DeferredPrompt>,
    /// A prompt was taken and awaits the user's answer.
    awaiting_choice: bool,
    installed: bool,
    standalone: bool,
    platform: Platform,
}

impl InstallPromptCapture {
    /// Create a holder for a page with the given user agent.
    ///
    /// `standalone` is true when the page already runs as an installed app.
    pub fn new(user_agent: &str, standalone: bool) -> Self {
        Self {
            deferred: None,
            awaiting_choice: false,
            installed: standalone,
            standalone,
            platform: Platform::detect(user_agent),
        }
    }

    /// Store an offer. Ignored when the app is already installed.
    pub fn capture(&mut self, prompt: DeferredPrompt) -> bool {
        if self.installed {
            debug!("Install offer ignored, app already installed");
            return false;
        }
        self.deferred = Some(prompt);
        true
    }

    /// Consume the offer to show it. Succeeds at most once per offer.
    pub fn take_prompt(&mut self) -> Result<DeferredPrompt, ServiceWorkerError> {
        let prompt = self.deferred.take().ok_or_else(|| {
            ServiceWorkerError::InstallPrompt("no install offer available".to_string())
        })?;
        self.awaiting_choice = true;
        Ok(prompt)
    }

    /// Record the user's answer to the prompt taken last.
    pub fn resolve(&mut self, choice: UserChoice) -> Result<(), ServiceWorkerError> {
        if !self.awaiting_choice {
            return Err(ServiceWorkerError::InstallPrompt(
                "no prompt awaiting a choice".to_string(),
            ));
        }
        self.awaiting_choice = false;
        if choice == UserChoice::Accepted {
            self.installed = true;
        }
        debug!(?choice, "Install prompt resolved");
        Ok(())
    }

    /// The platform reported that the app was installed.
    pub fn mark_installed(&mut self) {
        self.installed = true;
        self.deferred = None;
    }

    /// Drop an unconsumed offer (page navigated away).
    pub fn discard(&mut self) {
        self.deferred = None;
        self.awaiting_choice = false;
    }

    /// An offer is held and the app is not installed.
    pub fn is_installable(&self) -> bool {
        self.deferred.is_some() && !self.installed
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }
}

//! [`AppManagerFunction`] – the closed set of app manager interactions.

use std::fmt;
use std::str::FromStr;

use crate::error::AppManagerError;

/// Which single interaction an [`AppManager`][crate::AppManager] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppManagerFunction {
    /// Start the configured app.
    Start,
    /// Stop whatever app is running.  Best-effort.
    Stop,
    /// Fetch the app list once.
    List,
    /// Follow the app list as it changes.
    ContinuousList,
}

impl AppManagerFunction {
    pub const ALL: [AppManagerFunction; 4] = [
        AppManagerFunction::Start,
        AppManagerFunction::Stop,
        AppManagerFunction::List,
        AppManagerFunction::ContinuousList,
    ];

    /// The selector string used on command lines and in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            AppManagerFunction::Start => "start",
            AppManagerFunction::Stop => "stop",
            AppManagerFunction::List => "list",
            AppManagerFunction::ContinuousList => "list_apps",
        }
    }
}

impl fmt::Display for AppManagerFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppManagerFunction {
    type Err = AppManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|function| function.as_str() == s)
            .ok_or_else(|| AppManagerError::UnknownFunction(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_selector() {
        assert_eq!("start".parse(), Ok(AppManagerFunction::Start));
        assert_eq!("stop".parse(), Ok(AppManagerFunction::Stop));
        assert_eq!("list".parse(), Ok(AppManagerFunction::List));
        assert_eq!("list_apps".parse(), Ok(AppManagerFunction::ContinuousList));
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for function in AppManagerFunction::ALL {
            assert_eq!(function.to_string().parse(), Ok(function));
        }
    }

    #[test]
    fn unknown_selector_is_a_configuration_error() {
        assert_eq!(
            "restart".parse::<AppManagerFunction>(),
            Err(AppManagerError::UnknownFunction("restart".to_string()))
        );
        assert!("".parse::<AppManagerFunction>().is_err());
        assert!("START".parse::<AppManagerFunction>().is_err());
    }
}

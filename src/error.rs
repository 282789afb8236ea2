// Copyright (c) 2023 The TQUIC Authors.
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

//! Error type for congestion control configuration and diagnostics.
//!
//! The per-ACK decision path never fails; errors only surface from the
//! configuration surface and from rendering diagnostics.

use strum_macros::EnumIter;

/// Congestion control error.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter)]
pub enum Error {
    /// The configuration is invalid, e.g. an unknown parameter name or a
    /// malformed value.
    InvalidConfig(String),

    /// Diagnostics could not be serialized.
    SerializeError(String),
}

impl Error {
    /// Return the error number used by the C caller.
    #[cfg_attr(not(feature = "ffi"), allow(dead_code))]
    pub(crate) fn to_errno(&self) -> libc::c_int {
        match self {
            Error::InvalidConfig(_) => -1,
            Error::SerializeError(_) => -2,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializeError(format!("{}", err))
    }
}

impl std::convert::From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error::InvalidConfig(format!("{}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn error_to_errno() {
        for err in Error::iter() {
            assert!(err.to_errno() < 0);
        }
    }

    #[test]
    fn parse_int_error() {
        use std::error::Error;
        let e = "x".parse::<u32>().unwrap_err();
        let e = super::Error::from(e);

        assert_eq!(
            format!("{}", e),
            "InvalidConfig(\"invalid digit found in string\")"
        );
        assert!(e.source().is_none());
    }

    #[test]
    fn serde_error() {
        let e = serde_json::from_str::<u32>("{").unwrap_err();
        let e = Error::from(e);
        assert!(matches!(e, Error::SerializeError(_)));
    }
}

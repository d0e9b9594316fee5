use crate::{
    Config, Connection, DataSourceInfo, DriverInfo, EntryPoint, ErrorKind, HandleKind,
    Native, RawHandle, Result, append_attribute,
    diagnostics::{complete, require},
    redact_connection_string,
};
use std::{fmt, sync::Arc, time::Duration};

/// User name and password appended to the connection string as `UID` and `PWD`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A loaded native library, root of every connection.
pub struct Library<N: Native> {
    native: Arc<N>,
    config: Config,
}

impl<N: Native> Library<N> {
    /// Wraps `native`, failing when it lacks any of the required entry points.
    pub fn new(native: N, config: Config) -> Result<Self> {
        let missing = EntryPoint::ALL
            .iter()
            .filter(|v| !v.is_optional() && !native.supports(**v))
            .map(|v| v.symbol())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            let error = ErrorKind::NativeLibraryLoad.error(format!(
                    "The native library {} does not export {}",
                    native.name(),
                    missing.join(", ")
                ),
            );
            log::error!("{:#}", error);
            return Err(error);
        }
        if !native.supports(EntryPoint::Cancel) {
            log::debug!(
                "The native library {} does not support cancellation",
                native.name()
            );
        }
        Ok(Self {
            native: Arc::new(native),
            config,
        })
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens a connection.
    ///
    /// `credentials`, when present, are appended to `connection_string`. The
    /// `timeout` is the login timeout, falling back to [`Config::login_timeout`].
    pub fn connect(
        &self,
        connection_string: &str,
        credentials: Option<&Credentials>,
        timeout: Option<Duration>,
    ) -> Result<Connection<N>> {
        let mut full = connection_string.to_string();
        if let Some(credentials) = credentials {
            append_attribute(&mut full, "UID", &credentials.user);
            append_attribute(&mut full, "PWD", &credentials.password);
        }
        let timeout = timeout.or(self.config.login_timeout);
        let context = || {
            format!(
                "While connecting to `{}`",
                redact_connection_string(connection_string)
            )
        };
        let native = self.native.as_ref();
        let raw = require(
            native,
            native.alloc_connection(),
            ErrorKind::Connection,
            HandleKind::Environment,
            RawHandle::NULL,
        )
        .map_err(|e| {
            let error = e.context(context());
            log::error!("{:#}", error);
            error
        })?;
        if let Err(e) = complete(
            native,
            native.connect(raw, &full, timeout),
            ErrorKind::Connection,
            HandleKind::Connection,
            raw,
        ) {
            let error = e.context(context());
            log::error!("{:#}", error);
            if !native.free_connection(raw).is_success() {
                log::warn!("Could not free the connection handle {} after a failed connect", raw);
            }
            return Err(error);
        }
        log::debug!("Opened connection {} through {}", raw, native.name());
        Ok(Connection::new(self.native.clone(), self.config.clone(), raw))
    }

    /// Installed ODBC drivers.
    pub fn drivers(&self) -> Result<Vec<DriverInfo>> {
        self.enumerate(EntryPoint::Drivers, |native| native.drivers())
    }

    /// Configured data source names.
    pub fn data_sources(&self) -> Result<Vec<DataSourceInfo>> {
        self.enumerate(EntryPoint::DataSources, |native| native.data_sources())
    }

    fn enumerate<T>(
        &self,
        entry: EntryPoint,
        call: impl FnOnce(&N) -> crate::Outcome<Vec<T>>,
    ) -> Result<Vec<T>> {
        let native = self.native.as_ref();
        if !native.supports(entry) {
            return Err(ErrorKind::State.error(format!(
                "The native library {} does not support {}",
                native.name(),
                entry
            )));
        }
        complete(
            native,
            call(native),
            ErrorKind::Execution,
            HandleKind::Environment,
            RawHandle::NULL,
        )
        .map(Option::unwrap_or_default)
        .map_err(|e| {
            let error = e.context(format!("While listing with {}", entry));
            log::error!("{:#}", error);
            error
        })
    }
}

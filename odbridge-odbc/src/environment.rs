use crate::CBox;
use odbc_sys as sys;
use odbridge_core::{BridgeError, ErrorKind, Result};
use std::{
    ptr,
    sync::{OnceLock, PoisonError, RwLock, RwLockReadGuard},
};

/// `SQL_OV_ODBC3`
const ODBC_VERSION_3: usize = 3;

static ENVIRONMENT: OnceLock<RwLock<State>> = OnceLock::new();

pub(crate) enum State {
    Ready(CBox<sys::HEnv>),
    Failed(String),
    ShutDown,
}

impl State {
    pub(crate) fn handle(&self) -> Result<sys::HEnv> {
        match self {
            State::Ready(v) => Ok(**v),
            State::Failed(message) => Err(ErrorKind::NativeLibraryLoad.error(message.clone())),
            State::ShutDown => Err(ErrorKind::NativeLibraryLoad
                .error("The ODBC environment of this process was shut down")),
        }
    }
}

fn allocate() -> State {
    let mut handle: sys::Handle = ptr::null_mut();
    let rc = unsafe { sys::SQLAllocHandle(sys::HandleType::Env, ptr::null_mut(), &mut handle) };
    if rc != sys::SqlReturn::SUCCESS && rc != sys::SqlReturn::SUCCESS_WITH_INFO {
        return State::Failed(format!(
            "Could not allocate the ODBC environment handle, SQLAllocHandle returned {}",
            rc.0
        ));
    }
    let environment = CBox::new(handle as sys::HEnv, |v| {
        let rc = unsafe { sys::SQLFreeHandle(sys::HandleType::Env, v as sys::Handle) };
        if rc != sys::SqlReturn::SUCCESS {
            log::warn!(
                "Could not free the ODBC environment handle, SQLFreeHandle returned {}",
                rc.0
            );
        }
    });
    let rc = unsafe {
        sys::SQLSetEnvAttr(
            *environment,
            sys::EnvironmentAttribute::OdbcVersion,
            ODBC_VERSION_3 as sys::Pointer,
            0,
        )
    };
    if rc != sys::SqlReturn::SUCCESS && rc != sys::SqlReturn::SUCCESS_WITH_INFO {
        return State::Failed(format!(
            "The driver manager refused ODBC version 3, SQLSetEnvAttr returned {}",
            rc.0
        ));
    }
    log::debug!("Allocated the ODBC environment {:?}", *environment);
    State::Ready(environment)
}

/// The process wide environment, allocated on first use.
///
/// The guard is held for the whole native call, [`shutdown`] waits for it.
pub(crate) fn environment() -> Result<RwLockReadGuard<'static, State>> {
    Ok(ENVIRONMENT
        .get_or_init(|| RwLock::new(allocate()))
        .read()
        .map_err(BridgeError::from)?)
}

/// Frees the ODBC environment of this process.
///
/// Every connection must be closed before. Afterwards no [`crate::OdbcNative`]
/// can be created again in this process.
pub fn shutdown() {
    let slot = ENVIRONMENT.get_or_init(|| RwLock::new(State::ShutDown));
    let mut state = slot.write().unwrap_or_else(PoisonError::into_inner);
    if matches!(*state, State::Ready(..)) {
        log::debug!("Shutting down the ODBC environment");
    }
    *state = State::ShutDown;
}

use async_trait::async_trait;
use luminal_kernel::photon::{Photon, PhotonError, PhotonResult};
use rhai::{AST, Dynamic, Engine, EvalAltResult, FnPtr};
use std::any::Any;
use std::sync::Arc;

/// Compiled script shared by every unit a file declares.
#[derive(Clone)]
pub(crate) struct Script {
    pub engine: Arc<Engine>,
    pub ast: Arc<AST>,
}

impl Script {
    fn call(&self, function: &str, state: &Dynamic) -> Result<Dynamic, Box<EvalAltResult>> {
        FnPtr::new(function)?.call::<Dynamic>(&self.engine, &self.ast, (state.clone(),))
    }
}

/// A photon backed by a Rhai script.
pub struct RhaiPhoton {
    type_name: String,
    script: Script,
    state: Dynamic,
    finalizer: Option<FnPtr>,
}

impl RhaiPhoton {
    pub(crate) fn new(
        type_name: String,
        script: Script,
        state: Dynamic,
        finalizer: Option<FnPtr>,
    ) -> Self {
        Self {
            type_name,
            script,
            state,
            finalizer,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// State returned by the script's `init` function.
    pub fn state(&self) -> &Dynamic {
        &self.state
    }

    /// Call a script function with the instance state as its only argument.
    pub fn call(&self, function: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        self.script.call(function, &self.state)
    }
}

impl std::fmt::Debug for RhaiPhoton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiPhoton")
            .field("type_name", &self.type_name)
            .field("state", &self.state)
            .field("finalizer", &self.finalizer.as_ref().map(|f| f.fn_name()))
            .finish()
    }
}

#[async_trait]
impl Photon for RhaiPhoton {
    async fn finalize(&mut self) -> PhotonResult<bool> {
        let Some(finalizer) = &self.finalizer else {
            return Err(PhotonError::FinalizerNotImplemented);
        };

        let result = finalizer
            .call::<Dynamic>(&self.script.engine, &self.script.ast, (self.state.clone(),))
            .map_err(|e| PhotonError::Finalizer(e.to_string()))?;

        // anything but an explicit `false` counts as a clean shutdown
        Ok(result.as_bool().unwrap_or(true))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A script unit without the photon capability.
pub struct RhaiObject {
    type_name: String,
    script: Script,
    state: Dynamic,
}

impl RhaiObject {
    pub(crate) fn new(type_name: String, script: Script, state: Dynamic) -> Self {
        Self {
            type_name,
            script,
            state,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn state(&self) -> &Dynamic {
        &self.state
    }

    pub fn call(&self, function: &str) -> Result<Dynamic, Box<EvalAltResult>> {
        self.script.call(function, &self.state)
    }
}

impl std::fmt::Debug for RhaiObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RhaiObject")
            .field("type_name", &self.type_name)
            .field("state", &self.state)
            .finish()
    }
}

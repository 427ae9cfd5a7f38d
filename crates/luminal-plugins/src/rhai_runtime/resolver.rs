use super::declaration::{Declaration, parse_declarations};
use super::engine::{RhaiEngineConfig, build_engine};
use super::photon::{RhaiObject, RhaiPhoton, Script};
use async_trait::async_trait;
use luminal_kernel::photon::{Instance, PhotonDescriptor, PhotonError, PhotonResolver, ResolveError};
use rhai::{Dynamic, EvalAltResult};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Resolves `.rhai` photon scripts.
#[derive(Debug, Clone, Default)]
pub struct RhaiResolver {
    config: RhaiEngineConfig,
}

impl RhaiResolver {
    pub const EXTENSION: &'static str = "rhai";

    pub fn new(config: RhaiEngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RhaiEngineConfig {
        &self.config
    }
}

#[async_trait]
impl PhotonResolver for RhaiResolver {
    fn extensions(&self) -> Vec<String> {
        vec![Self::EXTENSION.to_string()]
    }

    async fn resolve(
        &self,
        path: &Path,
        search_path: &[PathBuf],
    ) -> Result<Vec<PhotonDescriptor>, ResolveError> {
        let source = match tokio::fs::read_to_string(path).await {
            Ok(source) => source,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ResolveError::NotFound(path.display().to_string()));
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(ResolveError::Syntax {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let engine = build_engine(&self.config, path.parent(), search_path);
        let mut ast = engine.compile(&source).map_err(|e| ResolveError::Syntax {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        ast.set_source(path.display().to_string());

        let value = engine
            .eval_ast::<Dynamic>(&ast)
            .map_err(|e| classify(path, &e))?;
        let declarations = parse_declarations(path, value)?;
        debug!(path = %path.display(), units = declarations.len(), "Resolved rhai photon script");

        let script = Script {
            engine: Arc::new(engine),
            ast: Arc::new(ast),
        };
        Ok(declarations
            .into_iter()
            .map(|declaration| describe(declaration, script.clone()))
            .collect())
    }
}

fn describe(declaration: Declaration, script: Script) -> PhotonDescriptor {
    let Declaration {
        type_name,
        metadata,
        capabilities,
        init,
        finalize,
    } = declaration;
    let is_photon = metadata.is_some();
    let unit_type = type_name.clone();

    let mut descriptor = PhotonDescriptor::new(type_name, move |ctx| {
        let state = match &init {
            Some(init) => init
                .call::<Dynamic>(&script.engine, &script.ast, ())
                .map_err(|e| PhotonError::InstantiationFailed {
                    name: ctx.name().to_string(),
                    message: e.to_string(),
                })?,
            None => Dynamic::UNIT,
        };

        Ok(if is_photon {
            Instance::Photon(Box::new(RhaiPhoton::new(
                unit_type.clone(),
                script.clone(),
                state,
                finalize.clone(),
            )))
        } else {
            Instance::Plain(Box::new(RhaiObject::new(unit_type.clone(), script.clone(), state)))
        })
    });

    if let Some(metadata) = metadata {
        descriptor = descriptor.with_metadata(metadata);
    }
    for capability in capabilities {
        descriptor = descriptor.with_capability(capability);
    }
    descriptor
}

/// Missing imports and broken imported modules count as import failures.
fn classify(path: &Path, err: &EvalAltResult) -> ResolveError {
    match err {
        EvalAltResult::ErrorModuleNotFound(module, _) => {
            ResolveError::NotFound(format!("module '{module}' imported by {}", path.display()))
        }
        EvalAltResult::ErrorParsing(..) => ResolveError::Syntax {
            path: path.to_path_buf(),
            message: err.to_string(),
        },
        EvalAltResult::ErrorInModule(_, inner, _) => match classify(path, inner) {
            ResolveError::Execution { .. } => ResolveError::Execution {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
            other => other,
        },
        _ => ResolveError::Execution {
            path: path.to_path_buf(),
            message: err.to_string(),
        },
    }
}

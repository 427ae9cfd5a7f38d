//! Reading unit declarations out of a script's final value.

use luminal_kernel::photon::{PhotonMetadata, ResolveError};
use rhai::{Array, Dynamic, FnPtr, Map};
use std::path::Path;

/// One unit declared by a script.
#[derive(Debug, Clone)]
pub(crate) struct Declaration {
    pub type_name: String,
    pub metadata: Option<PhotonMetadata>,
    pub capabilities: Vec<String>,
    pub init: Option<FnPtr>,
    pub finalize: Option<FnPtr>,
}

fn invalid(path: &Path, message: impl Into<String>) -> ResolveError {
    ResolveError::InvalidDeclaration {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// `()` declares nothing, a map declares one unit, an array of maps several.
pub(crate) fn parse_declarations(
    path: &Path,
    value: Dynamic,
) -> Result<Vec<Declaration>, ResolveError> {
    if value.is_unit() {
        return Ok(Vec::new());
    }
    if value.is_map() {
        let map = value
            .try_cast::<Map>()
            .ok_or_else(|| invalid(path, "declaration is not an object map"))?;
        return Ok(vec![parse_one(path, map)?]);
    }
    if value.is_array() {
        let items = value
            .try_cast::<Array>()
            .ok_or_else(|| invalid(path, "declarations are not an array"))?;
        return items
            .into_iter()
            .map(|item| {
                item.try_cast::<Map>()
                    .ok_or_else(|| invalid(path, "every declaration must be an object map"))
                    .and_then(|map| parse_one(path, map))
            })
            .collect();
    }

    Err(invalid(
        path,
        format!(
            "script must evaluate to a map or an array of maps, got {}",
            value.type_name()
        ),
    ))
}

fn parse_one(path: &Path, map: Map) -> Result<Declaration, ResolveError> {
    let type_name = map
        .get("type_name")
        .and_then(|v| v.clone().into_string().ok())
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| invalid(path, "declaration needs a non-empty `type_name` string"))?;

    let metadata = match map.get("photon") {
        None => None,
        Some(value) if value.is_unit() => None,
        Some(value) if value.is_bool() => value
            .as_bool()
            .unwrap_or(false)
            .then(|| PhotonMetadata::new(type_name.clone())),
        Some(value) => {
            let mut meta = value
                .clone()
                .try_cast::<Map>()
                .ok_or_else(|| invalid(path, "`photon` must be a metadata map or a bool"))?;
            if !meta.contains_key("name") {
                meta.insert("name".into(), Dynamic::from(type_name.clone()));
            }
            let meta: PhotonMetadata = rhai::serde::from_dynamic(&Dynamic::from(meta))
                .map_err(|e| invalid(path, format!("invalid photon metadata: {e}")))?;
            Some(meta)
        }
    };

    let capabilities = match map.get("capabilities") {
        None => Vec::new(),
        Some(value) => value
            .clone()
            .try_cast::<Array>()
            .ok_or_else(|| invalid(path, "`capabilities` must be an array of strings"))?
            .into_iter()
            .map(|cap| {
                cap.into_string()
                    .map_err(|_| invalid(path, "`capabilities` must be an array of strings"))
            })
            .collect::<Result<Vec<_>, _>>()?,
    };

    Ok(Declaration {
        init: function(path, &map, "init")?,
        finalize: function(path, &map, "finalize")?,
        type_name,
        metadata,
        capabilities,
    })
}

/// A function pointer, or the name of a script function.
fn function(path: &Path, map: &Map, key: &str) -> Result<Option<FnPtr>, ResolveError> {
    let Some(value) = map.get(key) else {
        return Ok(None);
    };
    if value.is_unit() {
        return Ok(None);
    }
    if value.is_fnptr() {
        return Ok(value.clone().try_cast::<FnPtr>());
    }
    if let Ok(name) = value.clone().into_string() {
        return FnPtr::new(name)
            .map(Some)
            .map_err(|e| invalid(path, format!("`{key}` is not a valid function name: {e}")));
    }
    Err(invalid(path, format!("`{key}` must be a function pointer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhai::Engine;

    fn eval(script: &str) -> Dynamic {
        Engine::new().eval::<Dynamic>(script).unwrap()
    }

    #[test]
    fn unit_declares_nothing() {
        let declarations = parse_declarations(Path::new("a.rhai"), Dynamic::UNIT).unwrap();
        assert!(declarations.is_empty());
    }

    #[test]
    fn single_map_with_metadata_defaults() {
        let value =
            eval(r#"#{ type_name: "Clock", photon: #{ author: "ops" }, init: Fn("init") }"#);
        let declarations = parse_declarations(Path::new("clock.rhai"), value).unwrap();

        assert_eq!(declarations.len(), 1);
        let clock = &declarations[0];
        assert_eq!(clock.type_name, "Clock");
        let meta = clock.metadata.as_ref().unwrap();
        assert_eq!(meta.name, "Clock");
        assert_eq!(meta.author, "ops");
        assert_eq!(meta.version, "0.0.0");
        assert_eq!(clock.init.as_ref().map(|f| f.fn_name()), Some("init"));
        assert!(clock.finalize.is_none());
    }

    #[test]
    fn array_of_maps() {
        let value = eval(
            r#"[
                #{ type_name: "Alpha", photon: true, finalize: "done" },
                #{ type_name: "Delta", capabilities: ["math"] },
            ]"#,
        );
        let declarations = parse_declarations(Path::new("multi.rhai"), value).unwrap();

        assert_eq!(declarations.len(), 2);
        assert!(declarations[0].metadata.is_some());
        assert_eq!(declarations[0].finalize.as_ref().map(|f| f.fn_name()), Some("done"));
        assert!(declarations[1].metadata.is_none());
        assert_eq!(declarations[1].capabilities, vec!["math"]);
    }

    #[test]
    fn missing_type_name_is_invalid() {
        let value = eval(r#"#{ photon: true }"#);
        let err = parse_declarations(Path::new("bad.rhai"), value).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidDeclaration { .. }));
    }

    #[test]
    fn scalar_result_is_invalid() {
        let err = parse_declarations(Path::new("bad.rhai"), Dynamic::from(42_i64)).unwrap_err();
        assert!(err.to_string().contains("map or an array"));
    }
}

//! Static asset bundles.
//!
//! Bundle definitions live in a `bundles.yml` next to the assets:
//!
//! ```yaml
//! js-all:
//!   output: js/bundle.js
//!   contents:
//!     - js/vendor.js
//!     - js/site.js
//! ```
//!
//! In debug mode each source file is served individually; otherwise
//! templates get the single built output URL. [`AssetRegistry::build`]
//! concatenates the sources into the outputs — minification stays an
//! external concern (run your minifier over the outputs).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;

/// One named bundle: the files that feed it and the file it produces.
#[derive(Clone, Debug, Deserialize)]
pub struct Bundle {
    pub output: String,
    pub contents: Vec<String>,
}

/// Bundle definitions bound to an asset directory and URL prefix.
#[derive(Clone)]
pub struct AssetRegistry {
    dir: PathBuf,
    url_prefix: String,
    debug: bool,
    bundles: HashMap<String, Bundle>,
}

impl AssetRegistry {
    /// Loads bundle definitions from `<dir>/bundles.yml`.
    pub fn from_yaml(
        dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        debug: bool,
    ) -> Result<Self, Error> {
        let dir = dir.into();
        let text = fs::read_to_string(dir.join("bundles.yml"))?;
        let bundles =
            serde_yaml::from_str(&text).map_err(|e| Error::Assets(e.to_string()))?;
        Ok(Self::from_bundles(dir, url_prefix, debug, bundles))
    }

    pub fn from_bundles(
        dir: impl Into<PathBuf>,
        url_prefix: impl Into<String>,
        debug: bool,
        bundles: HashMap<String, Bundle>,
    ) -> Self {
        Self {
            dir: dir.into(),
            url_prefix: url_prefix.into(),
            debug,
            bundles,
        }
    }

    /// URLs a template should emit for a bundle: every source file in debug
    /// mode, the single output otherwise. Unknown bundles yield nothing.
    pub fn urls(&self, bundle: &str) -> Vec<String> {
        let Some(bundle) = self.bundles.get(bundle) else {
            return Vec::new();
        };
        if self.debug {
            bundle
                .contents
                .iter()
                .map(|file| format!("{}{file}", self.url_prefix))
                .collect()
        } else {
            vec![format!("{}{}", self.url_prefix, bundle.output)]
        }
    }

    /// Concatenates each bundle's contents into its output file. A no-op in
    /// debug mode, where sources are served individually.
    pub fn build(&self) -> Result<(), Error> {
        if self.debug {
            return Ok(());
        }
        for bundle in self.bundles.values() {
            let mut combined = Vec::new();
            for file in &bundle.contents {
                combined.extend(fs::read(self.dir.join(file))?);
                combined.push(b'\n');
            }
            let output = self.dir.join(&bundle.output);
            if let Some(parent) = output.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(output, combined)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(debug: bool) -> AssetRegistry {
        let bundles = HashMap::from([(
            "js-all".to_string(),
            Bundle {
                output: "js/bundle.js".to_string(),
                contents: vec!["js/vendor.js".to_string(), "js/site.js".to_string()],
            },
        )]);
        AssetRegistry::from_bundles("/tmp/static", "/static/", debug, bundles)
    }

    #[test]
    fn debug_mode_lists_each_source() {
        assert_eq!(
            registry(true).urls("js-all"),
            vec!["/static/js/vendor.js", "/static/js/site.js"]
        );
    }

    #[test]
    fn production_mode_lists_the_output() {
        assert_eq!(registry(false).urls("js-all"), vec!["/static/js/bundle.js"]);
    }

    #[test]
    fn unknown_bundle_is_empty() {
        assert!(registry(false).urls("nope").is_empty());
    }

    #[test]
    fn parses_yaml_definitions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("bundles.yml"),
            "js-all:\n  output: js/bundle.js\n  contents:\n    - js/site.js\n",
        )
        .unwrap();

        let registry = AssetRegistry::from_yaml(dir.path(), "/static/", false).unwrap();
        assert_eq!(registry.urls("js-all"), vec!["/static/js/bundle.js"]);
    }

    #[test]
    fn build_concatenates_contents() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::write(dir.path().join("js/vendor.js"), "var a = 1;").unwrap();
        fs::write(dir.path().join("js/site.js"), "var b = 2;").unwrap();

        let bundles = HashMap::from([(
            "js-all".to_string(),
            Bundle {
                output: "js/bundle.js".to_string(),
                contents: vec!["js/vendor.js".to_string(), "js/site.js".to_string()],
            },
        )]);
        let registry = AssetRegistry::from_bundles(dir.path(), "/static/", false, bundles);
        registry.build().unwrap();

        let built = fs::read_to_string(dir.path().join("js/bundle.js")).unwrap();
        assert_eq!(built, "var a = 1;\nvar b = 2;\n");
    }
}

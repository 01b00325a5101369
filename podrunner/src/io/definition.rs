//! Loading test definitions from YAML.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::definition::TestDefinition;
use crate::error::DefinitionError;

/// Load and validate a test definition.
///
/// Any failure is reported as a [`DefinitionError`] so the CLI can exit with
/// the "invalid" code before a single step runs.
pub fn load_definition(path: &Path) -> Result<TestDefinition> {
    debug!(path = %path.display(), "loading test definition");
    let definition = fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))
        .and_then(|contents| parse_definition(&contents))
        .map_err(|err| DefinitionError {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })?;
    debug!(
        name = %definition.name,
        steps = definition.steps.len(),
        nodes = definition.config.nodes,
        times = definition.config.times,
        "test definition loaded"
    );
    Ok(definition)
}

/// Parse and validate a definition from YAML text.
pub fn parse_definition(contents: &str) -> Result<TestDefinition> {
    let definition: TestDefinition = serde_yaml::from_str(contents).context("parse yaml")?;
    definition.validate()?;
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::core::summary::Counts;

    const PIN_TEST: &str = r#"
name: pin-propagation
config:
  nodes: 5
  selector: app=go-ipfs-stress
  times: 5
  grace_shutdown: 10
  expected:
    successes: 20
    failures: 0
    timeouts: 0
steps:
  - name: add file
    on_node: 1
    cmd: head -c 1000 /dev/urandom | ipfs add -q
    timeout: 10
    outputs:
      - line: 0
        save_to: HASH
        save_to_file: hashes.txt
  - name: cat file
    on_node: 2
    end_node: 5
    inputs: [HASH]
    cmd: ipfs cat $HASH | ipfs add -q
    assertions:
      - line: 0
        should_be_equal_to: HASH
    write_to_file: cat-output.txt
"#;

    #[test]
    fn parses_full_definition() {
        let def = parse_definition(PIN_TEST).expect("parses");
        assert_eq!(def.name, "pin-propagation");
        assert_eq!(def.config.nodes, 5);
        assert_eq!(def.config.grace_shutdown, 10);
        assert_eq!(def.config.expected, Counts::new(20, 0, 0));
        assert_eq!(def.steps.len(), 2);

        let add = &def.steps[0];
        assert_eq!(add.last_node(), 1);
        assert_eq!(add.outputs[0].save_to, "HASH");
        assert_eq!(
            add.outputs[0].save_to_file,
            Some(PathBuf::from("hashes.txt"))
        );

        let cat = &def.steps[1];
        assert_eq!(cat.node_count(), 4);
        assert_eq!(cat.timeout(), None);
        assert_eq!(cat.assertions[0].should_be_equal_to, "HASH");
        assert_eq!(cat.write_to_file, Some(PathBuf::from("cat-output.txt")));
    }

    #[test]
    fn applies_defaults() {
        let def = parse_definition(
            r#"
name: minimal
config:
  nodes: 1
  expected: { successes: 1 }
steps:
  - name: echo
    on_node: 1
    cmd: echo ok
    assertions: [{ line: 0, should_be_equal_to: ok }]
"#,
        )
        .expect("parses");
        assert_eq!(def.config.times, 1);
        assert_eq!(def.config.grace_shutdown, 0);
        assert_eq!(def.config.selector, "");
        assert_eq!(def.config.expected, Counts::new(1, 0, 0));
        assert!(def.steps[0].outputs.is_empty());
    }

    #[test]
    fn load_wraps_errors_as_definition_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("broken.yaml");
        fs::write(&path, "name: x\nconfig: [").expect("write");
        let err = load_definition(&path).expect_err("malformed");
        let def_err = err.downcast_ref::<DefinitionError>().expect("definition error");
        assert_eq!(def_err.path, path);
        assert!(def_err.message.contains("parse yaml"));

        let missing = load_definition(&temp.path().join("missing.yaml")).expect_err("missing");
        assert!(missing.downcast_ref::<DefinitionError>().is_some());
    }

    #[test]
    fn load_reports_validation_failures() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("wide.yaml");
        fs::write(
            &path,
            r#"
name: too-wide
config:
  nodes: 2
  expected: {}
steps:
  - { name: s, on_node: 1, end_node: 3, cmd: "true" }
"#,
        )
        .expect("write");
        let err = load_definition(&path).expect_err("invalid");
        assert!(err.to_string().contains("exceeds config.nodes"));
    }
}

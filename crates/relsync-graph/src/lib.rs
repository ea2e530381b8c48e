//! Relationship store client.
//!
//! Wraps the `zed` relationship CLI, the only means of observing or
//! mutating permission-graph state:
//!
//! - [`GraphClient::read`]: fully-consistent existence check, returning
//!   the structured [`TupleRead`] rather than raw text
//! - [`GraphClient::apply`]: executes a [`StoreCommand`] (`create`,
//!   `touch`, or `bulk-delete`)
//!
//! Reads always pass `--consistency-full`: a drift check against a stale
//! read would skip corrective writes on false negatives and needed
//! deletes on false positives.

pub mod error;

pub use error::{Error, Result};

use std::process::{Command, Output};

use tracing::{debug, info, warn};

use relsync_types::{ObjectRef, RelationshipTuple, StoreCommand, TupleRead, RELATION_TAG};

const CONSISTENCY_FLAG: &str = "--consistency-full";

/// Client for the relationship store CLI.
pub struct GraphClient {
    bin: String,
}

impl GraphClient {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Reads the tuple matching a resource and relation, optionally
    /// narrowed to a subject. Delete reconciliation reads without a
    /// subject; the deleting actor does not know one.
    pub fn read(
        &self,
        resource: &ObjectRef,
        relation: &str,
        subject: Option<&ObjectRef>,
    ) -> Result<TupleRead> {
        let args = read_args(resource, relation, subject);
        debug!(bin = %self.bin, ?args, "consistent read");

        let output = self.run("read", &args)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let read = parse_read_output(&stdout);
        if let TupleRead::Unparsed(raw) = &read {
            warn!(output = %raw, "unexpected output shape from relationship read");
        }
        Ok(read)
    }

    /// Executes a store command. Failures carry the child's exit code;
    /// they are never swallowed.
    pub fn apply(&self, command: &StoreCommand) -> Result<()> {
        let (verb, args) = command_args(command);
        info!(bin = %self.bin, "running: {command}");
        self.run(verb, &args).map(drop)
    }

    fn run(&self, verb: &'static str, args: &[String]) -> Result<Output> {
        let output = Command::new(&self.bin)
            .arg("relationship")
            .arg(verb)
            .args(args)
            .output()
            .map_err(|source| Error::Spawn {
                bin: self.bin.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                verb,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(output)
    }
}

fn tagged(relation: &str) -> String {
    format!("{RELATION_TAG}{relation}")
}

fn read_args(resource: &ObjectRef, relation: &str, subject: Option<&ObjectRef>) -> Vec<String> {
    let mut args = vec![resource.to_string(), tagged(relation)];
    if let Some(subject) = subject {
        args.push(subject.to_string());
    }
    args.push(CONSISTENCY_FLAG.to_string());
    args
}

fn command_args(command: &StoreCommand) -> (&'static str, Vec<String>) {
    match command {
        StoreCommand::Create(tuple) => ("create", tuple_args(tuple)),
        StoreCommand::Touch(tuple) => ("touch", tuple_args(tuple)),
        StoreCommand::BulkDelete { resource, relation } => {
            ("bulk-delete", vec![resource.to_string(), tagged(relation)])
        }
    }
}

fn tuple_args(tuple: &RelationshipTuple) -> Vec<String> {
    vec![
        tuple.resource.to_string(),
        tagged(&tuple.relation),
        tuple.subject.to_string(),
    ]
}

/// Interprets read output: empty means the tuple is absent; otherwise the
/// first non-empty line must parse as a tuple. Non-empty output that does
/// not parse is surfaced as [`TupleRead::Unparsed`] so callers can recover
/// it as a diagnostic no-op instead of acting on text they cannot
/// interpret.
fn parse_read_output(stdout: &str) -> TupleRead {
    let Some(line) = stdout.lines().find(|line| !line.trim().is_empty()) else {
        return TupleRead::Absent;
    };

    match line.trim().parse::<RelationshipTuple>() {
        Ok(tuple) => TupleRead::Present(tuple),
        Err(_) => TupleRead::Unparsed(stdout.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_read_output_is_absent() {
        assert_eq!(parse_read_output(""), TupleRead::Absent);
        assert_eq!(parse_read_output("  \n"), TupleRead::Absent);
    }

    #[test]
    fn first_line_of_read_output_is_parsed() {
        let stdout = "hbi/host:r0 t_member notifications/group:w1\nhbi/host:r9 t_member notifications/group:w2\n";
        let TupleRead::Present(tuple) = parse_read_output(stdout) else {
            panic!("expected a parsed tuple");
        };
        assert_eq!(tuple.resource.id, "r0");
        assert_eq!(tuple.subject.id, "w1");
    }

    #[test]
    fn unparsable_read_output_is_preserved() {
        let read = parse_read_output("WARN consistency token expired");
        assert_eq!(
            read,
            TupleRead::Unparsed("WARN consistency token expired".to_string())
        );
    }

    #[test]
    fn read_args_carry_the_consistency_flag() {
        let resource = ObjectRef::new("hbi", "host", "r1");
        let subject = ObjectRef::new("notifications", "group", "w1");

        let args = read_args(&resource, "member", Some(&subject));
        assert_eq!(
            args,
            vec![
                "hbi/host:r1".to_string(),
                "t_member".to_string(),
                "notifications/group:w1".to_string(),
                "--consistency-full".to_string(),
            ]
        );

        let args = read_args(&resource, "member", None);
        assert_eq!(
            args,
            vec![
                "hbi/host:r1".to_string(),
                "t_member".to_string(),
                "--consistency-full".to_string(),
            ]
        );
    }

    #[test]
    fn command_args_match_store_verbs() {
        let tuple = RelationshipTuple::new(
            ObjectRef::new("hbi", "host", "r1"),
            "member",
            ObjectRef::new("notifications", "group", "w1"),
        );

        let (verb, args) = command_args(&StoreCommand::Create(tuple.clone()));
        assert_eq!(verb, "create");
        assert_eq!(args[1], "t_member");

        let (verb, _) = command_args(&StoreCommand::Touch(tuple));
        assert_eq!(verb, "touch");

        let (verb, args) = command_args(&StoreCommand::BulkDelete {
            resource: ObjectRef::new("notifications", "integration", "i9"),
            relation: "workspace".to_string(),
        });
        assert_eq!(verb, "bulk-delete");
        assert_eq!(args, vec!["notifications/integration:i9", "t_workspace"]);
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::{Path, PathBuf};

        fn stub(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("zed-stub");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        #[test]
        fn read_reports_absent_on_empty_output() {
            let dir = tempfile::tempdir().unwrap();
            let bin = stub(dir.path(), "exit 0");
            let client = GraphClient::new(bin.to_string_lossy());

            let read = client
                .read(&ObjectRef::new("hbi", "host", "r1"), "member", None)
                .unwrap();
            assert_eq!(read, TupleRead::Absent);
        }

        #[test]
        fn read_parses_tuple_when_flag_is_passed() {
            let dir = tempfile::tempdir().unwrap();
            // Only answers when the consistency flag made it onto the
            // command line.
            let bin = stub(
                dir.path(),
                r#"case "$@" in
  *--consistency-full*) echo "hbi/host:r0 t_member notifications/group:w1" ;;
esac"#,
            );
            let client = GraphClient::new(bin.to_string_lossy());

            let read = client
                .read(&ObjectRef::new("hbi", "host", "r1"), "member", None)
                .unwrap();
            let TupleRead::Present(tuple) = read else {
                panic!("expected a tuple, consistency flag was dropped");
            };
            assert_eq!(tuple.resource.id, "r0");
        }

        #[test]
        fn apply_propagates_the_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let bin = stub(dir.path(), "echo 'permission denied' >&2\nexit 7");
            let client = GraphClient::new(bin.to_string_lossy());

            let command = StoreCommand::BulkDelete {
                resource: ObjectRef::new("notifications", "integration", "i9"),
                relation: "workspace".to_string(),
            };
            let err = client.apply(&command).unwrap_err();
            assert_eq!(err.exit_code(), Some(7));
            assert!(err.to_string().contains("permission denied"));
        }

        #[test]
        fn apply_succeeds_on_clean_exit() {
            let dir = tempfile::tempdir().unwrap();
            let bin = stub(dir.path(), "exit 0");
            let client = GraphClient::new(bin.to_string_lossy());

            let tuple = RelationshipTuple::new(
                ObjectRef::new("hbi", "host", "r1"),
                "member",
                ObjectRef::new("notifications", "group", "w1"),
            );
            assert!(client.apply(&StoreCommand::Touch(tuple)).is_ok());
        }
    }
}

//! Testing utilities and mock implementations.
//!
//! Mock implementations of the store, fetcher and runner traits, so the
//! pipeline can be exercised without S3, network access or containers.
//!
//! # Example
//!
//! ```rust,ignore
//! use mapstage_core::testing::{MockFetcher, MockObjectStore, MockStepRunner};
//!
//! let store = MockObjectStore::new("dev");
//! let runner = MockStepRunner::new();
//! runner.produce(StepKind::Extract, intermediate.join("monaco.osrm.ebg")).await;
//! runner.set_outcome(StepKind::Customize, StepOutcome::Failed { exit_code: Some(1) }).await;
//! ```

mod mock_fetcher;
mod mock_object_store;
mod mock_step_runner;

pub use mock_fetcher::MockFetcher;
pub use mock_object_store::{MockObjectStore, RecordedStoreCall};
pub use mock_step_runner::{MockStepRunner, RecordedRun};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::config::{Config, LayoutConfig};

    /// A config rooted at `root` with a small dataset name.
    pub fn config_in(root: &Path) -> Config {
        let mut config = Config {
            layout: LayoutConfig {
                root: root.to_path_buf(),
                ..Default::default()
            },
            ..Default::default()
        };
        config.dataset.filename = "monaco-latest.osm.pbf".to_string();
        config.dataset.url = "http://127.0.0.1:9/monaco-latest.osm.pbf".to_string();
        config
    }

    /// Writes a shell script standing in for the compose program.
    ///
    /// Each invocation appends its arguments to `<dir>/compose.log`. `up`
    /// prints 25 stdout lines and 12 stderr lines, then behaves by service
    /// name: `fail` exits 3, `slow` sleeps for 30 seconds, `binary` prints a
    /// line of raw non-UTF-8 bytes followed by 30 more lines and exits 0,
    /// anything else exits 0. `down` exits 0 unless `<dir>/hang-down` exists,
    /// in which case it sleeps for 30 seconds. Run it as `["sh", <script>]`.
    pub fn compose_stub(dir: &Path) -> std::io::Result<(PathBuf, PathBuf)> {
        let script = dir.join("compose-stub.sh");
        let log = dir.join("compose.log");
        let body = format!(
            r#"#!/bin/sh
echo "$*" >> "{log}"
if [ "$3" = "down" ]; then
  if [ -f "{dir}/hang-down" ]; then
    exec sleep 30
  fi
  exit 0
fi
echo "profile=$OSRM_PROFILE"
i=1
while [ $i -le 25 ]; do
  echo "out $i"
  i=$((i + 1))
done
i=1
while [ $i -le 12 ]; do
  echo "err $i" >&2
  i=$((i + 1))
done
case "$4" in
  fail) exit 3 ;;
  slow) exec sleep 30 ;;
  binary)
    printf 'progress \377\376 bar\n'
    sleep 1
    i=1
    while [ $i -le 30 ]; do
      echo "after $i"
      i=$((i + 1))
    done
    ;;
esac
exit 0
"#,
            log = log.display(),
            dir = dir.display()
        );
        std::fs::write(&script, body)?;
        Ok((script, log))
    }

    /// Lines appended to the stub's log so far.
    pub fn compose_log(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

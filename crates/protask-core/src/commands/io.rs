use std::fs;
use std::io::{
  self,
  Read,
  Write
};
use std::path::Path;

use anyhow::Context;
use tracing::{
  info,
  instrument
};

use crate::blob::BlobStore;
use crate::intent::{
  Intent,
  Outcome
};
use crate::render::Renderer;
use crate::store::TaskStore;

/// Writes the full document to `output`,
/// or stdout when none is given.
#[instrument(skip(store))]
pub(super) fn cmd_export<B: BlobStore>(
  store: &TaskStore<B>,
  output: Option<&Path>
) -> anyhow::Result<()> {
  info!("command export");

  let doc = store.export_snapshot()?;
  match output {
    | Some(path) => {
      fs::write(path, &doc).with_context(
        || {
          format!(
            "failed to write {}",
            path.display()
          )
        }
      )?;
      info!(file = %path.display(), bytes = doc.len(), "exported snapshot");
    }
    | None => {
      let mut out = io::stdout().lock();
      writeln!(out, "{doc}")?;
    }
  }
  Ok(())
}

/// Replaces the whole state from a file
/// (`-` reads stdin). A rejected
/// document leaves the store untouched.
#[instrument(skip(store, renderer))]
pub(super) fn cmd_import<B: BlobStore>(
  store: &mut TaskStore<B>,
  renderer: &Renderer,
  path: &Path
) -> anyhow::Result<()> {
  info!("command import");

  let raw = if path == Path::new("-") {
    let mut buf = String::new();
    io::stdin()
      .read_to_string(&mut buf)
      .context(
        "failed to read import from \
         stdin"
      )?;
    buf
  } else {
    fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read {}",
          path.display()
        )
      })?
  };

  let outcome = store
    .dispatch(Intent::Import(raw))
    .context(
      "import rejected; existing \
       tasks were kept"
    )?;
  if let Outcome::Count(count) = outcome
  {
    renderer.message(&format!(
      "Imported {count} task(s)."
    ))?;
  }
  Ok(())
}

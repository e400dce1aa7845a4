use crate::commands::synth::SynthCommand;
use crate::config::build_config;
use crate::error::Error;
use crate::runner::{Runner, Settings};
use crate::writer::Writer;
use branchstack_common::Template;
use eyre::WrapErr;
use serde_json::json;
use std::path::{Path, PathBuf};

pub(crate) struct SynthRunner<'a> {
    pub(crate) command: SynthCommand,
    pub(crate) writer: &'a Writer,
    pub(crate) settings: &'a Settings,
}

impl Runner for SynthRunner<'_> {
    fn writer(&self) -> &Writer {
        self.writer
    }

    fn settings(&self) -> &Settings {
        self.settings
    }

    /// Declare the stacks and write out their templates
    async fn run(&mut self) -> Result<(), Error> {
        let composition = self.command.context.composition()?;
        let app = self.app()?;

        let store = self
            .lookup_store(app.config(), !self.command.no_cache)
            .await;

        let templates = app
            .synth(&composition, store.as_ref())
            .await
            .map_err(|e| {
                self.error(
                    Some("Failed to synthesize stacks"),
                    Some(&format!("{e:#}")),
                    None,
                )
            })?;

        if self.command.stdout {
            return self.print(&templates);
        }

        let out = self
            .command
            .out
            .clone()
            .unwrap_or_else(|| PathBuf::from(build_config().out_dir));

        let written = write_templates(&out, &templates)?;

        if self.writer.is_structured() {
            return self.writer.json(json!(templates
                .iter()
                .zip(&written)
                .map(|(template, path)| json!({
                    "stack": template.stack_name(),
                    "path": path,
                    "published": template
                        .published()
                        .iter()
                        .map(|key| key.to_string())
                        .collect::<Vec<_>>(),
                }))
                .collect::<Vec<_>>()));
        }

        for (template, path) in templates.iter().zip(&written) {
            self.writer.text(&format!(
                "{} {} {}",
                console::style(format!("{:>12}", "Synthesized")).green().bold(),
                template.stack_name(),
                console::style(path.display()).dim()
            ))?;
        }

        Ok(())
    }
}

impl SynthRunner<'_> {
    fn print(&self, templates: &[Template]) -> Result<(), Error> {
        for template in templates {
            if self.writer.is_structured() {
                self.writer.json(template.document())?;
            } else {
                self.writer.text(&template.to_json()?)?;
            }
        }

        Ok(())
    }
}

/// Write `<stack>.template.json` files, returns their paths
fn write_templates(out: &Path, templates: &[Template]) -> eyre::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out)
        .inspect_err(|e| log::error!("Failed to create {out:?}: {e:?}"))
        .wrap_err(format!("Failed to create {}", out.display()))?;

    templates
        .iter()
        .map(|template| {
            let path = out.join(format!("{}.template.json", template.stack_name()));

            std::fs::write(&path, template.to_json()?)
                .wrap_err(format!("Failed to write {}", path.display()))?;

            log::info!("Wrote {path:?}");
            Ok(path)
        })
        .collect()
}

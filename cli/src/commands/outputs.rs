mod runner;
use crate::error::Error;
use crate::runner::{Runnable, Runner, Settings};
use crate::writer::Writer;
use branchstack_common::{LookupKey, LookupStore};
use runner::OutputsRunner;
use serde_json::{json, Map, Value};

#[derive(clap::Args, Clone)]
pub(crate) struct OutputsCommand {
    /// Branch whose published values to print
    #[arg(short, long, env = "BRANCH")]
    branch: String,
}

impl Runnable for OutputsCommand {
    fn runner<'a>(&self, writer: &'a Writer, settings: &'a Settings) -> impl Runner + 'a {
        OutputsRunner {
            command: self.clone(),
            writer,
            settings,
        }
    }
}

/// Read every value published for the branch
pub(crate) async fn collect(
    store: &dyn LookupStore,
    branch: &str,
) -> eyre::Result<Vec<(LookupKey, Option<String>)>> {
    let mut outputs = vec![];

    for key in LookupKey::branch_keys(branch) {
        let value = store.get(&key).await?;
        outputs.push((key, value));
    }

    Ok(outputs)
}

/// Field name in structured output
fn field(key: &LookupKey) -> &'static str {
    match key {
        LookupKey::VpcId => "vpc_id",
        LookupKey::DbHost(_) => "db_host",
        LookupKey::ServiceArn(_) => "service_arn",
        LookupKey::AlbDnsName(_) => "alb_dns_name",
    }
}

pub(crate) fn report(
    writer: &Writer,
    branch: &str,
    outputs: &[(LookupKey, Option<String>)],
) -> Result<(), Error> {
    if writer.is_structured() {
        let mut values: Map<String, Value> = outputs
            .iter()
            .map(|(key, value)| (field(key).to_string(), json!(value)))
            .collect();

        values.insert("branch".into(), json!(branch));
        return writer.json(Value::Object(values));
    }

    for (key, value) in outputs {
        writer.text(&format!(
            "{} {}",
            console::style(format!("{key}:")).bold(),
            match value {
                Some(value) => console::style(value.as_str()),
                None => console::style("not published").dim().yellow(),
            }
        ))?;
    }

    Ok(())
}

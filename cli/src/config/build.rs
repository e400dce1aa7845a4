use std::sync::OnceLock;
use std::time::Duration;

/// Settings of the tool itself, as opposed to the infrastructure it declares
pub(crate) struct BuildConfig<'a> {
    /// Lookup values resolved during synthesis are cached here
    pub(crate) context_file: &'a str,

    /// Directory synthesized templates are written to
    pub(crate) out_dir: &'a str,

    /// How long a cached lookup value is trusted
    pub(crate) cache_expires_in: chrono::Duration,

    /// Delay between two stack status checks
    pub(crate) poll_interval: Duration,

    /// Give up waiting for a stack after this long
    pub(crate) stack_timeout: Duration,
}

static CONFIG: OnceLock<BuildConfig> = OnceLock::new();

pub(crate) fn build_config() -> &'static BuildConfig<'static> {
    CONFIG.get_or_init(|| BuildConfig {
        context_file: option_env!("BRANCHSTACK_CONTEXT_FILE")
            .unwrap_or("branchstack.context.json"),

        out_dir: option_env!("BRANCHSTACK_OUT_DIR").unwrap_or("stacks.out"),
        cache_expires_in: chrono::Duration::hours(24),
        poll_interval: Duration::from_secs(10),
        stack_timeout: Duration::from_secs(60 * 60),
    })
}

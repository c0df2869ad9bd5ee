/*! Integration tests for the dashfields document model.
 *
 * Everything here goes through the public API against the in-memory backend.
 * Shared setup lives in `helpers`.
 */

#[ctor::ctor]
fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("dashfields=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod cast;
mod doc;
mod list;
mod ops;
mod serialization;

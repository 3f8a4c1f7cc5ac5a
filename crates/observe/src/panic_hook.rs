/// Installs a panic hook that terminates the whole process after any thread
/// panics.
///
/// A panicked background task would otherwise leave the service running in
/// a degraded state, e.g. with the expiry sweep dead while the API keeps
/// accepting requests. Crashing lets the orchestrator restart us into a
/// known-good state.
pub fn set_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        default_hook(panic);
        tracing::error!("thread panicked; exiting process");
        std::process::exit(1);
    }));
}

use std::panic;
use std::process;

use xcoder_cli::run;

fn main() -> anyhow::Result<()> {
  let orig_hook = panic::take_hook();
  // Catch panics in worker threads so a single wedged attempt can't leave
  // the process hanging without a non-zero exit code.
  panic::set_hook(Box::new(move |panic_info| {
    orig_hook(panic_info);
    process::exit(1);
  }));
  run()
}

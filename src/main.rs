use clap::Parser;
use miette::Result;
use catalink::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head` or `grep -q` panics on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    let mut clog = colog::default_builder();
    clog.filter(None, global.log_level());
    clog.init();

    match cli.command {
        Commands::Link(args) => catalink::cli::commands::link::run(args, &global),
        Commands::Describe(args) => catalink::cli::commands::describe::run(args, &global),
        Commands::Config(cmd) => catalink::cli::commands::config::run(cmd, &global),
        Commands::Completions(args) => catalink::cli::commands::completions::run(args),
    }
}

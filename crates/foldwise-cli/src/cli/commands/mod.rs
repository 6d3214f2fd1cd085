use super::args::*;

pub mod inspect;
pub mod runs;
pub mod trace;

use crate::exit_codes::EXIT_SUCCESS;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = cli.config.as_deref();
    match cli.cmd {
        Command::Inspect(args) => inspect::run(args, cli.format),
        Command::Runs(args) => match args.cmd {
            RunsSub::List(list) => runs::cmd_list(list, config, cli.format).await,
            RunsSub::Get(get) => runs::cmd_get(get, config, cli.format).await,
            RunsSub::Exists(exists) => runs::cmd_exists(exists, config, cli.format).await,
            RunsSub::Publish(publish) => runs::cmd_publish(publish, config, cli.format).await,
        },
        Command::Trace(args) => match args.cmd {
            TraceSub::Select(select) => trace::cmd_select(select, config, cli.format).await,
        },
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(EXIT_SUCCESS)
        }
    }
}

/// `serve` subcommand.
mod serve;

pub(crate) use serve::serve;

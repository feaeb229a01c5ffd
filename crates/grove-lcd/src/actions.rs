use clap::Subcommand;
use miette::Result;
use tracing::{debug, trace};

pub use context::Context;
pub mod context;

macro_rules! commands {
	(
		[$argtype:ty => $ctxcode:block]
		$(
			$(#[$meta:meta])*
			$modname:ident => $enumname:ident($argname:ident)
		),+
	) => {
		$(
			$(#[$meta])*
			pub mod $modname;
		)*

		#[derive(Debug, Clone, Subcommand)]
		pub enum Action {
			$(
				$(#[$meta])*
				$enumname($modname::$argname),
			)*
		}

		pub async fn run(ctx: $argtype) -> Result<()> {
			let ctxfn = $ctxcode;
			match ctxfn(ctx)? {
				$(
					$(#[$meta])*
					(Action::$enumname(args), ctx) => $modname::run(ctx.with_top(args)).await,
				)*
			}
		}
	};
}

use crate::args::Args;

commands! {
	[Args => {|args: Args| -> Result<(Action, Context<()>)> {
		let ctx = Context::new().with_top(args.action);
		debug!(version=%env!("CARGO_PKG_VERSION"), "starting up");
		trace!(?ctx, "context");
		Ok(ctx.take_top())
	}}]

	call => Call(CallArgs),
	exercise => Exercise(ExerciseArgs),
	serve => Serve(ServeArgs)
}

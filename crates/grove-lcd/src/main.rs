#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> miette::Result<()> {
	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.map_err(|err| miette::miette!("tokio: build runtime: {err}"))?
		.block_on(async {
			let (args, _guard) = grove_lcd::args()?;
			grove_lcd::run(args).await
		})
}

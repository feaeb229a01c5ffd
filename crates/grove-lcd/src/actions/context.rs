use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

#[derive(Clone, Debug)]
pub struct Context<A = (), B = ()> {
	pub args_top: A,
	pub args_sub: B,
	pub progress: MultiProgress,
}

impl Context {
	pub fn new() -> Self {
		Self {
			args_top: (),
			args_sub: (),
			progress: MultiProgress::new(),
		}
	}
}

impl<A, B> Context<A, B> {
	pub fn with_top<C>(self, args_top: C) -> Context<C, B> {
		Context::<C, B> {
			args_top,
			args_sub: self.args_sub,
			progress: self.progress,
		}
	}

	pub fn take_top(self) -> (A, Context<(), B>) {
		(
			self.args_top,
			Context::<(), B> {
				args_top: (),
				args_sub: self.args_sub,
				progress: self.progress,
			},
		)
	}

	/// A bar counting through the steps of a scripted run.
	pub fn step_bar(&self, len: u64) -> ProgressBar {
		let style = ProgressStyle::default_bar()
			.template("[{bar:.green/blue}] {wide_msg} {pos}/{len}")
			.unwrap_or_else(|_| ProgressStyle::default_bar());
		self.progress.add(ProgressBar::new(len).with_style(style))
	}

	/// Print a line to stdout without tearing any bar.
	pub fn println(&self, line: impl AsRef<str>) {
		self.progress.suspend(|| println!("{}", line.as_ref()));
	}
}

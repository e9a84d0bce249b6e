use crate::event::LogEvent;

/// Consumer of classified events: a console renderer, a file, an exporter.
pub trait EventSink {
	fn emit(&mut self, event: LogEvent);
}

impl EventSink for Vec<LogEvent> {
	fn emit(&mut self, event: LogEvent) {
		self.push(event);
	}
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
	fn emit(&mut self, event: LogEvent) {
		(**self).emit(event);
	}
}

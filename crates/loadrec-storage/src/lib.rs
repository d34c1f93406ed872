//! Lock-free recording pipeline: a bounded single-producer/single-consumer
//! ring buffer drained by a dedicated sink writer thread into a values file.

mod sync;

pub mod ring_buffer;
pub mod sink_writer;
pub mod values_writer;

pub use ring_buffer::{channel, Consumer, Producer, PublishError, WaitStrategy};
pub use sink_writer::{spawn_sink_writer, SinkWriter, SinkWriterHandle, WriteReport, WriterStats};
pub use values_writer::{ValuesFileWriter, WriterState};

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mjpeg_streamer::config::SourceConfig;
use mjpeg_streamer::source::render_frame;
use mjpeg_streamer::{
    to_jpeg, to_jpeg_with, FrameHolder, MjpegStream, PixelFormat, RowAddressing, StreamConfig,
    StreamMode,
};
use std::sync::Arc;

fn test_config(format: PixelFormat, addressing: RowAddressing) -> SourceConfig {
    SourceConfig {
        format,
        addressing,
        width: 320,
        height: 240,
        ..SourceConfig::default()
    }
}

fn benchmark_encode_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_rows");
    group.throughput(Throughput::Elements(320 * 240));

    for format in [
        PixelFormat::Grayscale,
        PixelFormat::Rgb888,
        PixelFormat::Rgb565,
        PixelFormat::Yuv422,
    ] {
        let frame = render_frame(&test_config(format, RowAddressing::Rows), 0).unwrap();

        group.bench_with_input(BenchmarkId::new("format", format), &frame, |b, frame| {
            b.iter(|| to_jpeg(black_box(frame), black_box(80), 64 * 1024).unwrap());
        });
    }

    group.finish();
}

fn benchmark_sinks(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_sink");
    let frame = render_frame(&test_config(PixelFormat::Rgb565, RowAddressing::Rows), 0).unwrap();

    group.bench_function("bounded", |b| {
        b.iter(|| to_jpeg(black_box(&frame), 80, 64 * 1024).unwrap().len());
    });
    group.bench_function("callback", |b| {
        b.iter(|| to_jpeg_with(black_box(&frame), 80, |chunk| chunk.len()).unwrap());
    });

    group.finish();
}

fn benchmark_flat_vs_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("addressing");

    for addressing in [RowAddressing::Rows, RowAddressing::Flat] {
        let frame = render_frame(&test_config(PixelFormat::Rgb888, addressing), 0).unwrap();
        let name = format!("{:?}", addressing);

        group.bench_with_input(BenchmarkId::new("rgb888", name), &frame, |b, frame| {
            b.iter(|| to_jpeg(black_box(frame), 80, 64 * 1024).unwrap());
        });
    }

    group.finish();
}

fn benchmark_stream_part(c: &mut Criterion) {
    let mut group = c.benchmark_group("stream_part");
    let frame = render_frame(&test_config(PixelFormat::Yuv422, RowAddressing::Rows), 0).unwrap();
    let jpeg = to_jpeg(&frame, 80, 64 * 1024).unwrap().into_bytes();

    for mode in [StreamMode::LengthDelimited, StreamMode::Chunked] {
        let holder = Arc::new(FrameHolder::new());
        holder.publish(frame.clone());
        let config = StreamConfig {
            mode,
            ..Default::default()
        };
        let mut stream = MjpegStream::discarding(holder, config);

        group.bench_function(BenchmarkId::new("raw", format!("{:?}", mode)), |b| {
            b.iter(|| stream.next_frame().unwrap());
        });
    }

    let holder = Arc::new(FrameHolder::new());
    holder.set_frame_jpeg(Bytes::clone(&jpeg), 320, 240).unwrap();
    let mut stream = MjpegStream::discarding(holder, StreamConfig::default());
    group.bench_function("jpeg_passthrough", |b| {
        b.iter(|| stream.next_frame().unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_encode_rows,
    benchmark_sinks,
    benchmark_flat_vs_rows,
    benchmark_stream_part
);
criterion_main!(benches);

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use webcam_capture::capture::{ChannelOrder, RawFrame};
use webcam_capture::ImageTensor;

fn frame_to_tensor(c: &mut Criterion) {
    let pixels: Vec<u8> = (0..720 * 480 * 3).map(|i| (i % 256) as u8).collect();

    c.bench_function("bgr_720x480_to_tensor", |b| {
        b.iter(|| {
            let frame = RawFrame::new(pixels.clone(), 720, 480, ChannelOrder::Bgr);
            black_box(ImageTensor::from_frame(frame).unwrap())
        })
    });
}

criterion_group!(benches, frame_to_tensor);
criterion_main!(benches);

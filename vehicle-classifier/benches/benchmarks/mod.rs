pub mod bench_pipeline;
pub mod bench_prepare;

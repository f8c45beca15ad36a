pub mod mp4_probe;

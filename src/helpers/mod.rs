pub mod median_buffer;

mod dequantize;
mod mul_fake_quantize;
mod registry;

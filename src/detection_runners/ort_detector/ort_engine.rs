//! ONNXRuntime backend for single-input, single-output detection models.

use anyhow::Result;
use half::f16;
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::{ExecutionProvider,
                          CPUExecutionProvider,
                          CUDAExecutionProvider,
                          TensorRTExecutionProvider,
                          CoreMLExecutionProvider},
    session::builder::{GraphOptimizationLevel, SessionBuilder},
    session::Session,
    tensor::TensorElementType,
    value::{DynValue, Tensor, ValueType},
};
use crate::common::{InferenceDevice, ModelConfig};
use crate::data::CROSS_MARK;

#[derive(Debug)]
pub struct OrtEngine {
    session: Session,
    input_name: String,
    input_dtype: TensorElementType,
    output_name: String,
}

impl OrtEngine {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        // Dynamically load the library from given path
        let ort_init = ort::init_from(&config.ort_lib_path);
        match ort_init.commit() {
            Ok(_) => {},
            Err(e) => {
                return Err(anyhow::anyhow!("Failed to commit ORT from {}: {:?}", config.ort_lib_path, e));
            }
        };

        let mut builder = Session::builder()?;

        let mut device = config.inference_device;
        match device {
            InferenceDevice::TensorRT(device_id) => {
                Self::build_trt(&mut builder, device_id).unwrap_or_else(|err| {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                })
            }
            InferenceDevice::CUDA(device_id) => {
                Self::build_cuda(&mut builder, device_id).unwrap_or_else(|err| {
                    log::warn!("{err}, Using cpu");
                    device = InferenceDevice::CPU;
                })
            }
            InferenceDevice::CoreML(_) => Self::build_coreml(&mut builder).unwrap_or_else(|err| {
                log::warn!("{err}, Using cpu");
                device = InferenceDevice::CPU;
            }),
            InferenceDevice::CPU => {
                Self::build_cpu(&mut builder)?;
            }
        }

        let session = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.weights_path)?;

        let input = match session.inputs.first() {
            Some(input) => input,
            None => anyhow::bail!("{CROSS_MARK} Model {} has no inputs", config.weights_path),
        };
        let input_name = input.name.clone();
        let input_dtype = match &input.input_type {
            ValueType::Tensor { ty, .. } => *ty,
            other => anyhow::bail!("{CROSS_MARK} Unsupported model input type: {:?}", other),
        };
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => anyhow::bail!("{CROSS_MARK} Model {} has no outputs", config.weights_path),
        };

        log::info!(
            "Backend: ONNXRuntime | Device: {} | Input: {} ({:?}) | Output: {}",
            device,
            input_name,
            input_dtype,
            output_name,
        );

        Ok(Self {
            session,
            input_name,
            input_dtype,
            output_name,
        })
    }

    fn build_trt(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let trt = TensorRTExecutionProvider::default()
            .with_device_id(device_id as i32)
            .with_fp16(false)
            .with_engine_cache(true)
            .with_engine_cache_path("trt-cache");
        if trt.is_available()? {
            match trt.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} TensorRT initialization failed: {:?}", err) }
            }
            log::info!("Initial model serialization with TensorRT may take some time...");
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} TensorRT execution provider not available")
        }
    }

    fn build_cuda(builder: &mut SessionBuilder, device_id: usize) -> Result<()> {
        let ep = CUDAExecutionProvider::default()
            .with_device_id(device_id as i32);
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} CUDA initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CUDA execution provider not available")
        }
    }

    fn build_coreml(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CoreMLExecutionProvider::default();
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} CoreML initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CoreML execution provider not available")
        }
    }

    fn build_cpu(builder: &mut SessionBuilder) -> Result<()> {
        let ep = CPUExecutionProvider::default();
        if ep.is_available()? {
            match ep.register(builder) {
                Ok(_) => { }
                Err(err) => { anyhow::bail!("{CROSS_MARK} CPU initialization failed: {:?}", err) }
            }
            Ok(())
        } else {
            anyhow::bail!("{CROSS_MARK} CPU execution provider not available")
        }
    }

    fn tensor_preprocess(x: Array<f32, IxDyn>, dtype: &TensorElementType) -> Result<DynValue> {
        let x = match dtype {
            TensorElementType::Float32 => Tensor::from_array(x)?.into_dyn(),
            TensorElementType::Float16 => Tensor::from_array(x.mapv(f16::from_f32))?.into_dyn(),
            _ => anyhow::bail!("Unsupported ort input tensor type: {:?}", dtype),
        };
        Ok(x)
    }

    fn tensor_postprocess(x: &DynValue) -> Result<Array<f32, IxDyn>> {
        if let Ok(y) = x.try_extract_array::<f32>() {
            return Ok(y.view().into_owned());
        }
        match x.try_extract_array::<f16>() {
            Ok(y) => Ok(y.view().mapv(f16::to_f32)),
            Err(err) => Err(anyhow::anyhow!("Unsupported ort output tensor: {:?}", err)),
        }
    }

    /// Runs the model on one preprocessed input and returns the first output as f32.
    pub fn run(&mut self, x: Array<f32, IxDyn>) -> Result<Array<f32, IxDyn>> {
        let input = Self::tensor_preprocess(x, &self.input_dtype)?;
        let outputs = self.session.run(ort::inputs![self.input_name.as_str() => input])?;
        let y = Self::tensor_postprocess(&outputs[self.output_name.as_str()])?;
        Ok(y)
    }

    pub fn try_fetch(&self, key: &str) -> Option<String> {
        match self.session.metadata() {
            Err(_) => None,
            Ok(metadata) => metadata.custom(key).unwrap_or_default(),
        }
    }
}

use std::process::ExitCode;

use burn::backend::{Autodiff, libtorch::LibTorch, libtorch::LibTorchDevice};
use clap::Parser;
use log::info;
use vgg_transfer::{
    artifacts::{RunArtifacts, generate_timestamp},
    config::{DeviceKind, TransferCmd},
    error::Result,
    training::{self, TrainingOptions},
};

fn run(cmd: &TransferCmd, timestamp: String) -> Result<()> {
    type AutoDiffBackend = Autodiff<LibTorch>;

    cmd.ensure_runnable()?;

    let device = match cmd.device {
        DeviceKind::Cpu => LibTorchDevice::Cpu,
        DeviceKind::Cuda => LibTorchDevice::Cuda(0),
    };
    info!("Training on {:?}", device);

    println!("Training session initiated ...");
    let artifacts = RunArtifacts::new(&cmd.output_dir, timestamp);
    training::train::<AutoDiffBackend>(&TrainingOptions::from(cmd), &artifacts, &device)?;

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let timestamp = generate_timestamp();
    println!("Time stamp generated: {timestamp}");

    let cmd = TransferCmd::parse();

    match run(&cmd, timestamp) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            println!("{err}");
            ExitCode::FAILURE
        }
    }
}

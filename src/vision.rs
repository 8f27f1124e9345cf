use crate::embedding::Embedding;
use crate::errors::EngineResult;
use crate::livescan::{ProbeError, ProbeSource};

/// Face detection summary reported by the external model.
#[derive(Debug, Clone)]
pub struct Detection {
    /// x, y, w, h
    pub bbox: [f32; 4],
    /// 5 points: x1,y1 .. x5,y5
    pub landmarks: [f32; 10],
    pub confidence: f32,
    pub spoofing: bool,
    pub multiple_faces: bool,
}

/// External face-model capability: raw image bytes in, detection or
/// embedding out. May fail with `NoFaceDetected` / `MultipleFaces`.
pub trait FaceModel {
    fn detect(&mut self, image: &[u8]) -> EngineResult<Detection>;
    fn embed(&mut self, image: &[u8]) -> EngineResult<Embedding>;
}

/// External frame source; failures are transient unless the device is gone.
pub trait CaptureSource {
    fn capture_frame(&mut self) -> Result<Vec<u8>, ProbeError>;
}

/// Composes a capture source with a face model into a probe source for the
/// live-scan loop. A frame the model cannot embed is a transient miss.
pub struct FrameProbeSource<C, M> {
    pub capture: C,
    pub model: M,
}

impl<C, M> ProbeSource for FrameProbeSource<C, M>
where
    C: CaptureSource + Send + 'static,
    M: FaceModel + Send + 'static,
{
    fn next_probe(&mut self) -> Result<Embedding, ProbeError> {
        let frame = self.capture.capture_frame()?;
        self.model
            .embed(&frame)
            .map_err(|err| ProbeError::Transient(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;

    struct OneFrame {
        served: bool,
    }

    impl CaptureSource for OneFrame {
        fn capture_frame(&mut self) -> Result<Vec<u8>, ProbeError> {
            if self.served {
                return Err(ProbeError::Transient("frame not ready".into()));
            }
            self.served = true;
            Ok(vec![1, 2, 3])
        }
    }

    struct StubModel {
        face_present: bool,
    }

    impl FaceModel for StubModel {
        fn detect(&mut self, _image: &[u8]) -> crate::errors::EngineResult<Detection> {
            if !self.face_present {
                return Err(EngineError::NoFaceDetected);
            }
            Ok(Detection {
                bbox: [0.0, 0.0, 10.0, 10.0],
                landmarks: [0.0; 10],
                confidence: 0.9,
                spoofing: false,
                multiple_faces: false,
            })
        }

        fn embed(&mut self, image: &[u8]) -> crate::errors::EngineResult<Embedding> {
            if !self.face_present {
                return Err(EngineError::NoFaceDetected);
            }
            Ok(Embedding::from_raw(
                image.iter().map(|b| *b as f32).collect(),
            ))
        }
    }

    #[test]
    fn frame_probe_source_chains_capture_and_model() {
        let mut source = FrameProbeSource {
            capture: OneFrame { served: false },
            model: StubModel { face_present: true },
        };
        let probe = source.next_probe().unwrap();
        assert_eq!(probe.as_slice(), &[1.0, 2.0, 3.0]);

        // Second frame is not ready: transient, retried by the scan loop.
        assert!(matches!(
            source.next_probe(),
            Err(ProbeError::Transient(_))
        ));
    }

    #[test]
    fn model_miss_is_transient() {
        let mut source = FrameProbeSource {
            capture: OneFrame { served: false },
            model: StubModel {
                face_present: false,
            },
        };
        match source.next_probe() {
            Err(ProbeError::Transient(msg)) => assert!(msg.contains("no face")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}


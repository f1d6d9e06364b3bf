//! Identity-photo capture and upload.
//!
//! The camera itself sits behind the [`CaptureDevice`] trait; hosts supply the
//! platform implementation. The component owns the single most-recent captured
//! frame and its upload to the voting service, where the frame is hashed and
//! bound to the authenticated session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::authenticator::SessionCredential;
use crate::defaults::{CAPTURE_QUALITY, CAPTURE_RESOLUTION};
use crate::error::VoteKitError;
use crate::gateway::ElectionGateway;

/// Failure reported by a [`CaptureDevice`] implementation.
#[derive(Debug, Error)]
pub enum CaptureDeviceError {
    /// The voter denied camera permission.
    #[error("camera permission denied")]
    PermissionDenied,
    /// No capture device exists on this host.
    #[error("no capture device available")]
    NoDevice,
    /// Any other device failure.
    #[error("{0}")]
    Failed(String),
}

/// Preferred capture parameters handed to the device on `open`.
#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Preferred frame width in pixels.
    pub width: u32,
    /// Preferred frame height in pixels.
    pub height: u32,
    /// Lossy encoding quality in `0.0..=1.0`.
    pub quality: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        let (width, height) = CAPTURE_RESOLUTION;
        Self {
            width,
            height,
            quality: CAPTURE_QUALITY,
        }
    }
}

/// A single frame as encoded by the device.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// Mime type of the encoding, e.g. `image/jpeg`.
    pub mime_type: String,
}

/// Video capture seam implemented by the host platform.
///
/// The device is a scarce resource with single-owner semantics: one component
/// instance holds it at a time, and `stop` must be safe to call repeatedly and
/// from any state.
#[allow(async_fn_in_trait)]
pub trait CaptureDevice {
    /// Requests exclusive access to the device at the preferred resolution.
    ///
    /// # Errors
    ///
    /// Returns an error if permission is denied or no device exists.
    async fn open(
        &mut self,
        config: &CaptureConfig,
    ) -> Result<(), CaptureDeviceError>;

    /// Snapshots the current video frame, lossily encoded at `quality`.
    ///
    /// # Errors
    ///
    /// Returns an error if the device fails to deliver a frame.
    async fn capture(
        &mut self,
        quality: f32,
    ) -> Result<EncodedFrame, CaptureDeviceError>;

    /// Stops the device. Idempotent.
    fn stop(&mut self);
}

/// The most recent captured identity frame. Capturing again replaces it.
#[derive(Clone)]
pub struct CapturedIdentityFrame {
    bytes: Vec<u8>,
    mime_type: String,
    captured_at: DateTime<Utc>,
}

impl CapturedIdentityFrame {
    /// Encoded image bytes, e.g. for a preview.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mime type of the encoded frame.
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Client-side capture timestamp.
    #[must_use]
    pub const fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

impl std::fmt::Debug for CapturedIdentityFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturedIdentityFrame")
            .field("bytes", &format_args!("{} bytes", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Server-issued proof that a captured photo was uploaded and hashed for this
/// session. Immutable once created; required input to ballot submission.
#[derive(Debug, Clone)]
pub struct IdentityBinding {
    image_hash: String,
    encrypted_reference: String,
}

impl IdentityBinding {
    /// SHA-256 hex digest of the uploaded image bytes.
    #[must_use]
    pub fn image_hash(&self) -> &str {
        &self.image_hash
    }

    /// Opaque reference to the encrypted stored image.
    #[must_use]
    pub fn encrypted_reference(&self) -> &str {
        &self.encrypted_reference
    }
}

/// Progress of the identity-capture flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No device acquired yet (or the device was released mid-flow).
    Uninitialized,
    /// Device open and streaming; no committed frame.
    DeviceReady,
    /// A frame is captured and previewable, awaiting upload or retake.
    FrameCommitted,
    /// The frame is uploaded and bound to the session. Terminal state.
    Uploaded,
}

impl CaptureState {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::DeviceReady => "DeviceReady",
            Self::FrameCommitted => "FrameCommitted",
            Self::Uploaded => "Uploaded",
        }
    }
}

/// Owns image acquisition, the single most-recent captured frame, and its
/// upload/hash-binding to the session.
pub struct IdentityCapture<D: CaptureDevice> {
    gateway: Arc<ElectionGateway>,
    device: D,
    config: CaptureConfig,
    state: CaptureState,
    acquired: bool,
    frame: Option<CapturedIdentityFrame>,
    binding: Option<IdentityBinding>,
}

impl<D: CaptureDevice> IdentityCapture<D> {
    /// Creates the component with the default capture configuration.
    #[must_use]
    pub fn new(gateway: Arc<ElectionGateway>, device: D) -> Self {
        Self::with_config(gateway, device, CaptureConfig::default())
    }

    /// Creates the component with an explicit capture configuration.
    #[must_use]
    pub fn with_config(
        gateway: Arc<ElectionGateway>,
        device: D,
        config: CaptureConfig,
    ) -> Self {
        Self {
            gateway,
            device,
            config,
            state: CaptureState::Uninitialized,
            acquired: false,
            frame: None,
            binding: None,
        }
    }

    /// Current state of the capture flow.
    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    /// The pending frame, for preview rendering.
    #[must_use]
    pub const fn frame(&self) -> Option<&CapturedIdentityFrame> {
        self.frame.as_ref()
    }

    /// The identity binding, once the upload succeeded.
    #[must_use]
    pub const fn identity_binding(&self) -> Option<&IdentityBinding> {
        self.binding.as_ref()
    }

    /// Requests exclusive access to the capture device.
    ///
    /// Valid at most once per component lifetime unless the device was
    /// explicitly released.
    ///
    /// # Errors
    ///
    /// [`VoteKitError::DeviceUnavailable`] if permission is denied or no
    /// device exists, [`VoteKitError::InvalidState`] if already acquired.
    pub async fn acquire_device(&mut self) -> Result<(), VoteKitError> {
        if self.state != CaptureState::Uninitialized {
            return Err(VoteKitError::InvalidState {
                expected: "Uninitialized",
                actual: self.state.as_str(),
            });
        }
        self.device.open(&self.config).await.map_err(|err| {
            VoteKitError::DeviceUnavailable {
                reason: err.to_string(),
            }
        })?;
        self.acquired = true;
        self.state = CaptureState::DeviceReady;
        tracing::debug!("capture device acquired");
        Ok(())
    }

    /// Snapshots the current video frame.
    ///
    /// Any previously captured frame is discarded; only the latest capture is
    /// ever retained.
    ///
    /// # Errors
    ///
    /// [`VoteKitError::DeviceUnavailable`] if the device fails,
    /// [`VoteKitError::InvalidState`] outside `DeviceReady`/`FrameCommitted`.
    pub async fn capture_frame(
        &mut self,
    ) -> Result<&CapturedIdentityFrame, VoteKitError> {
        if !matches!(
            self.state,
            CaptureState::DeviceReady | CaptureState::FrameCommitted
        ) {
            return Err(VoteKitError::InvalidState {
                expected: "DeviceReady or FrameCommitted",
                actual: self.state.as_str(),
            });
        }
        let encoded =
            self.device.capture(self.config.quality).await.map_err(|err| {
                VoteKitError::DeviceUnavailable {
                    reason: err.to_string(),
                }
            })?;
        self.state = CaptureState::FrameCommitted;
        Ok(&*self.frame.insert(CapturedIdentityFrame {
            bytes: encoded.bytes,
            mime_type: encoded.mime_type,
            captured_at: Utc::now(),
        }))
    }

    /// Discards the pending frame and returns to `DeviceReady` without
    /// touching the device.
    ///
    /// # Errors
    ///
    /// [`VoteKitError::InvalidState`] outside `FrameCommitted`.
    pub fn retake(&mut self) -> Result<(), VoteKitError> {
        if self.state != CaptureState::FrameCommitted {
            return Err(VoteKitError::InvalidState {
                expected: "FrameCommitted",
                actual: self.state.as_str(),
            });
        }
        self.frame = None;
        self.state = CaptureState::DeviceReady;
        Ok(())
    }

    /// Uploads the pending frame, bound to the authenticated session.
    ///
    /// On acceptance the returned [`IdentityBinding`] is stored, the state
    /// becomes `Uploaded`, and the device is stopped. The client re-hashes the
    /// uploaded bytes and refuses a binding whose hash does not match them.
    /// On rejection the state stays `FrameCommitted`; the voter may retry the
    /// upload or retake the photo.
    ///
    /// # Errors
    ///
    /// [`VoteKitError::Upload`] on a server rejection or hash mismatch,
    /// [`VoteKitError::NoFrame`] if no frame exists,
    /// [`VoteKitError::InvalidState`] outside `FrameCommitted`.
    pub async fn upload(
        &mut self,
        session: &SessionCredential,
    ) -> Result<&IdentityBinding, VoteKitError> {
        if self.state != CaptureState::FrameCommitted {
            return Err(VoteKitError::InvalidState {
                expected: "FrameCommitted",
                actual: self.state.as_str(),
            });
        }
        // Unreachable through the state machine, but the frame is the whole
        // point of the upload.
        let Some(frame) = self.frame.as_ref() else {
            return Err(VoteKitError::NoFrame);
        };

        let local_hash = hex::encode(Sha256::digest(&frame.bytes));
        let response = self
            .gateway
            .upload_identity_image(
                session.expose_token(),
                frame.bytes.clone(),
                &frame.mime_type,
                frame.captured_at,
            )
            .await
            .map_err(|err| {
                err.into_domain(|reason| VoteKitError::Upload { reason })
            })?;

        if response.image_hash != local_hash {
            return Err(VoteKitError::Upload {
                reason: format!(
                    "service hashed different bytes than were captured \
                     (got {}, expected {local_hash})",
                    response.image_hash
                ),
            });
        }

        self.state = CaptureState::Uploaded;
        self.device.stop();
        self.acquired = false;
        tracing::info!("identity photo uploaded and bound to session");
        Ok(&*self.binding.insert(IdentityBinding {
            image_hash: response.image_hash,
            encrypted_reference: response.encrypted_reference,
        }))
    }

    /// Stops the capture device. Idempotent and callable from any state; a
    /// pending (not yet uploaded) frame is discarded.
    pub fn release_device(&mut self) {
        if self.acquired {
            self.device.stop();
            self.acquired = false;
        }
        if matches!(
            self.state,
            CaptureState::DeviceReady | CaptureState::FrameCommitted
        ) {
            self.frame = None;
            self.state = CaptureState::Uninitialized;
        }
    }
}

impl<D: CaptureDevice> Drop for IdentityCapture<D> {
    fn drop(&mut self) {
        if self.acquired {
            self.device.stop();
        }
    }
}

//! Frame capture via the Windows Graphics Capture API.

use anyhow::{anyhow, Context, Result};
use image::ImageBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use windows::core::Interface;
use windows::Foundation::TypedEventHandler;
use windows::Graphics::Capture::{Direct3D11CaptureFramePool, GraphicsCaptureItem};
use windows::Graphics::DirectX::DirectXPixelFormat;
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Resource, ID3D11Texture2D,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAP_READ, D3D11_SDK_VERSION,
    D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::System::WinRT::Direct3D11::CreateDirect3D11DeviceFromDXGIDevice;
use windows::Win32::System::WinRT::Graphics::Capture::IGraphicsCaptureItemInterop;

use super::window::{find_window_by_process, get_client_area_info};
use super::{Frame, ScreenSource};
use crate::error::AutomationError;

/// Captures the client area of the target application's main window.
///
/// The window is re-discovered on every capture; the target app may be
/// restarted between frames and window handles go stale.
pub struct WindowCapture {
    process_name: String,
}

impl WindowCapture {
    pub fn new(process_name: &str) -> Self {
        Self {
            process_name: process_name.to_string(),
        }
    }
}

impl ScreenSource for WindowCapture {
    fn capture(&self) -> crate::error::Result<Frame> {
        capture_window_frame(&self.process_name)
            .map_err(|e| AutomationError::Capture(e.to_string()))
    }
}

/// Captures one frame of the named process's window, cropped to the client
/// area and converted from BGRA to RGBA.
fn capture_window_frame(process_name: &str) -> Result<Frame> {
    let hwnd = find_window_by_process(process_name)?;

    let (client_rect, client_offset) = get_client_area_info(hwnd)?;
    let client_width = (client_rect.right - client_rect.left) as u32;
    let client_height = (client_rect.bottom - client_rect.top) as u32;

    let (device, context) = create_d3d11_device()?;
    let item = create_capture_item(hwnd)?;
    let size = item.Size()?;

    let d3d_device = create_direct3d_device(&device)?;
    let frame_pool = Direct3D11CaptureFramePool::CreateFreeThreaded(
        &d3d_device,
        DirectXPixelFormat::B8G8R8A8UIntNormalized,
        1,
        size,
    )?;
    let session = frame_pool.CreateCaptureSession(&item)?;

    let frame_arrived = Arc::new(AtomicBool::new(false));
    let frame_arrived_clone = frame_arrived.clone();
    frame_pool.FrameArrived(&TypedEventHandler::new(
        move |_pool: &Option<Direct3D11CaptureFramePool>, _| {
            frame_arrived_clone.store(true, Ordering::SeqCst);
            Ok(())
        },
    ))?;

    session.StartCapture()?;

    let start = std::time::Instant::now();
    while !frame_arrived.load(Ordering::SeqCst) {
        if start.elapsed().as_secs() > 5 {
            // Stop the session explicitly; the timeout is the error to
            // surface, not a failed Close.
            let _ = session.Close();
            let _ = frame_pool.Close();
            return Err(anyhow!("timeout waiting for capture frame"));
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    let frame = frame_pool.TryGetNextFrame()?;
    let surface = frame.Surface()?;

    let access: windows::Win32::System::WinRT::Direct3D11::IDirect3DDxgiInterfaceAccess =
        surface.cast()?;
    let texture: ID3D11Texture2D = unsafe { access.GetInterface()? };

    let mut desc = D3D11_TEXTURE2D_DESC::default();
    unsafe { texture.GetDesc(&mut desc) };

    let staging_desc = D3D11_TEXTURE2D_DESC {
        Width: desc.Width,
        Height: desc.Height,
        MipLevels: 1,
        ArraySize: 1,
        Format: desc.Format,
        SampleDesc: desc.SampleDesc,
        Usage: D3D11_USAGE_STAGING,
        BindFlags: Default::default(),
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        MiscFlags: Default::default(),
    };

    let staging_texture = unsafe {
        let mut staging: Option<ID3D11Texture2D> = None;
        device.CreateTexture2D(&staging_desc, None, Some(&mut staging))?;
        staging.ok_or_else(|| anyhow!("failed to create staging texture"))?
    };

    unsafe {
        context.CopyResource(
            &staging_texture.cast::<ID3D11Resource>()?,
            &texture.cast::<ID3D11Resource>()?,
        );
    }

    let mapped = unsafe {
        let mut mapped = Default::default();
        context.Map(
            &staging_texture.cast::<ID3D11Resource>()?,
            0,
            D3D11_MAP_READ,
            0,
            Some(&mut mapped),
        )?;
        mapped
    };

    let crop_x = client_offset.x as u32;
    let crop_y = client_offset.y as u32;

    let mut img: Frame = ImageBuffer::new(client_width, client_height);

    let src_data = unsafe {
        std::slice::from_raw_parts(
            mapped.pData as *const u8,
            (mapped.RowPitch * desc.Height) as usize,
        )
    };
    let row_pitch = mapped.RowPitch as usize;

    for y in 0..client_height {
        let src_y = (crop_y + y) as usize;
        if src_y >= desc.Height as usize {
            break;
        }
        for x in 0..client_width {
            let src_x = (crop_x + x) as usize;
            if src_x >= desc.Width as usize {
                break;
            }
            let offset = src_y * row_pitch + src_x * 4;
            // BGRA -> RGBA
            let b = src_data[offset];
            let g = src_data[offset + 1];
            let r = src_data[offset + 2];
            let a = src_data[offset + 3];
            img.put_pixel(x, y, image::Rgba([r, g, b, a]));
        }
    }

    unsafe {
        context.Unmap(&staging_texture.cast::<ID3D11Resource>()?, 0);
    }

    session.Close()?;
    frame_pool.Close()?;

    Ok(img)
}

fn create_d3d11_device() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;

    unsafe {
        D3D11CreateDevice(
            None,
            D3D_DRIVER_TYPE_HARDWARE,
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT,
            None,
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )?;
    }

    Ok((
        device.ok_or_else(|| anyhow!("failed to create D3D11 device"))?,
        context.ok_or_else(|| anyhow!("failed to create D3D11 context"))?,
    ))
}

fn create_direct3d_device(
    device: &ID3D11Device,
) -> Result<windows::Graphics::DirectX::Direct3D11::IDirect3DDevice> {
    let dxgi_device: windows::Win32::Graphics::Dxgi::IDXGIDevice = device.cast()?;
    let inspectable = unsafe { CreateDirect3D11DeviceFromDXGIDevice(&dxgi_device)? };
    inspectable
        .cast()
        .context("failed to cast to IDirect3DDevice")
}

fn create_capture_item(hwnd: HWND) -> Result<GraphicsCaptureItem> {
    let class_name = windows::core::h!("Windows.Graphics.Capture.GraphicsCaptureItem");
    let interop: IGraphicsCaptureItemInterop = unsafe {
        windows::Win32::System::WinRT::RoGetActivationFactory(class_name)
            .context("failed to get IGraphicsCaptureItemInterop")?
    };
    unsafe {
        interop
            .CreateForWindow(hwnd)
            .context("failed to create capture item for window")
    }
}

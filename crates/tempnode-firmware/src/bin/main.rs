#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_futures::select::{Either, select};
use embassy_net::StackResources;
use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use esp_hal::gpio::Flex;
use esp_hal::rng::Rng;
use esp_hal::rtc_cntl::Rtc;
use esp_hal::timer::timg::TimerGroup;
use log::info;
use static_cell::StaticCell;
use tempnode_core::clock::SystemClock;
use tempnode_core::cycle::WakeCycle;
use tempnode_core::onewire::OneWire;
use tempnode_core::sensors::Ds18b20;
use tempnode_firmware::config::device_config;
use tempnode_firmware::hardware::{AdcSupply, OneWirePin, RtcSleep};
use tempnode_firmware::network::WifiUplink;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!(log::LevelFilter::Info);

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Wake");
    let config = device_config();

    let supply = AdcSupply::new(peripherals.ADC1, peripherals.GPIO1);

    let bus = OneWire::new(OneWirePin::new(Flex::new(peripherals.GPIO4)), Delay::new())
        .expect("Failed to release the 1-Wire line");
    let probe = Ds18b20::new(bus, config.sensor.addressing, config.sensor.resolution);

    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio_init = RADIO
        .init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());
    static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let (stack, mut runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );

    let mut cycle = WakeCycle {
        config: &config,
        supply,
        probe,
        uplink: WifiUplink::new(wifi_controller, stack, config.internet),
        clock: SystemClock,
        delay: embassy_time::Delay,
    };
    let mut sleeper = RtcSleep::new(Rtc::new(peripherals.LPWR));

    // The network runner only has to live as long as the cycle: the cycle
    // ends in deep sleep, which resets the chip.
    match select(runner.run(), cycle.wake(&mut sleeper)).await {
        Either::First(never) => never,
        Either::Second(_) => {}
    }

    unreachable!("deep sleep returned")
}
